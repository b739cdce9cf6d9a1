//! Headless render harness and scripted deadlines.
//!
//! [`TestRenderer`] bundles a [`Runtime`] with the in-memory host backend
//! so tests can mount trees, drive the cooperative loop in controlled
//! slices, fire host events, and assert on the resulting tree.

use std::time::Duration;

use weft_core::{
    Deadline, Element, HostError, HostNodeId, MemoryHost, RenderError, Runtime, Unconstrained,
    WorkStatus,
};

/// Deadline that reports exhaustion after a scripted number of units, so a
/// test can force a yield at an exact point in the loop.
pub struct CountingDeadline {
    remaining_units: usize,
}

impl CountingDeadline {
    /// Allows `units` units of work before the slice reports empty.
    pub fn new(units: usize) -> Self {
        Self {
            remaining_units: units,
        }
    }
}

impl Deadline for CountingDeadline {
    fn time_remaining(&mut self) -> Duration {
        // The loop probes once after each unit; the Nth probe ends the
        // slice.
        if self.remaining_units <= 1 {
            Duration::ZERO
        } else {
            self.remaining_units -= 1;
            Duration::from_secs(1)
        }
    }
}

/// Deadline that is always exhausted: every slice performs exactly one unit.
#[derive(Debug, Default)]
pub struct ExhaustedDeadline;

impl Deadline for ExhaustedDeadline {
    fn time_remaining(&mut self) -> Duration {
        Duration::ZERO
    }
}

/// Render harness over the in-memory host.
pub struct TestRenderer {
    runtime: Runtime<MemoryHost>,
    container: HostNodeId,
}

impl TestRenderer {
    pub fn new() -> Self {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        Self {
            runtime: Runtime::new(host),
            container,
        }
    }

    pub fn container(&self) -> HostNodeId {
        self.container
    }

    pub fn runtime(&self) -> &Runtime<MemoryHost> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<MemoryHost> {
        &mut self.runtime
    }

    pub fn host(&self) -> &MemoryHost {
        self.runtime.host()
    }

    /// Schedules a root render of `element` into the harness container.
    pub fn render(&mut self, element: Element) {
        self.runtime.render(element, self.container);
    }

    /// Drives all pending work to a commit.
    pub fn run_to_idle(&mut self) -> Result<(), RenderError> {
        self.runtime.run_to_completion()
    }

    /// Runs a single slice with an unconstrained deadline.
    pub fn run_once(&mut self) -> Result<WorkStatus, RenderError> {
        let mut unconstrained = Unconstrained;
        self.runtime.run(&mut unconstrained)
    }

    /// Drives pending work in slices of `units` units each, returning the
    /// number of slices it took to go idle.
    pub fn run_in_slices(&mut self, units: usize) -> Result<usize, RenderError> {
        let mut slices = 0;
        loop {
            slices += 1;
            let mut deadline = CountingDeadline::new(units);
            if self.runtime.run(&mut deadline)? == WorkStatus::Idle {
                return Ok(slices);
            }
        }
    }

    /// Fires the named listener on a host node.
    pub fn dispatch(&self, node: HostNodeId, event: &str) -> Result<bool, HostError> {
        self.host().dispatch(node, event)
    }

    /// The committed children of the container.
    pub fn roots(&self) -> Vec<HostNodeId> {
        self.host()
            .children_of(self.container)
            .map(|children| children.to_vec())
            .unwrap_or_default()
    }

    /// Depth-first text contents of the committed tree, in document order.
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![self.container];
        while let Some(id) = stack.pop() {
            if let Ok(node) = self.host().node(id) {
                if let Some(text) = node.text() {
                    out.push(text.to_string());
                }
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// Printable snapshot of the committed host tree.
    pub fn dump(&self) -> String {
        self.host().dump_tree(Some(self.container))
    }

    /// Live fiber count across the generations still held.
    pub fn live_fibers(&self) -> usize {
        self.runtime.with_state(|state| state.live_fibers())
    }
}

impl Default for TestRenderer {
    fn default() -> Self {
        Self::new()
    }
}
