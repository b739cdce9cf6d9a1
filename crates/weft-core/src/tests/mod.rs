mod engine_tests;

use std::time::Duration;

use crate::host::{HostNodeId, MemoryHost};
use crate::platform::Deadline;
use crate::runtime::Runtime;

pub(crate) fn new_runtime() -> (Runtime<MemoryHost>, HostNodeId) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    (Runtime::new(host), container)
}

/// Deadline granting `extra` generous probes before reporting an exhausted
/// slice; with zero the loop yields right after its first unit of work.
pub(crate) struct SliceBudget {
    pub(crate) extra: usize,
}

impl Deadline for SliceBudget {
    fn time_remaining(&mut self) -> Duration {
        if self.extra == 0 {
            Duration::ZERO
        } else {
            self.extra -= 1;
            Duration::from_secs(1)
        }
    }
}
