//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `weft-core`. Applications construct a
//! [`StdDriver`] and use it to build a [`weft_core::Runtime`] whose
//! scheduler signals through `std` synchronization primitives.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use weft_core::{Clock, Deadline, HostBackend, RenderError, Runtime, WorkScheduler, WorkStatus};

/// Scheduler that records work requests and pokes a registered waker.
pub struct StdWorkScheduler {
    work_requested: AtomicBool,
    waker: RwLock<Option<Arc<dyn Fn() + Send + Sync + 'static>>>,
}

impl StdWorkScheduler {
    pub fn new() -> Self {
        Self {
            work_requested: AtomicBool::new(false),
            waker: RwLock::new(None),
        }
    }

    /// Returns whether work has been requested since the last call.
    pub fn take_work_request(&self) -> bool {
        self.work_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked whenever new work is scheduled.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.write().unwrap() = Some(Arc::new(waker));
    }

    /// Clears any registered waker.
    pub fn clear_waker(&self) {
        *self.waker.write().unwrap() = None;
    }

    fn wake(&self) {
        let waker = self.waker.read().unwrap().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdWorkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdWorkScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdWorkScheduler")
            .field(
                "work_requested",
                &self.work_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl WorkScheduler for StdWorkScheduler {
    fn schedule_work(&self) {
        self.work_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Clock implementation backed by [`std::time`].
#[derive(Debug, Default, Clone)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed_millis(&self, since: Self::Instant) -> u64 {
        since.elapsed().as_millis() as u64
    }
}

impl StdClock {
    /// Returns the elapsed time as a [`Duration`] for convenience.
    pub fn elapsed(&self, since: Instant) -> Duration {
        since.elapsed()
    }
}

/// Deadline carving a fixed slice out of the host's frame budget; the loop
/// yields when the slice is spent.
pub struct TimeSliceDeadline {
    clock: StdClock,
    start: Instant,
    budget: Duration,
}

impl TimeSliceDeadline {
    pub fn new(budget: Duration) -> Self {
        let clock = StdClock;
        let start = clock.now();
        Self {
            clock,
            start,
            budget,
        }
    }
}

impl Deadline for TimeSliceDeadline {
    fn time_remaining(&mut self) -> Duration {
        self.budget.saturating_sub(self.clock.elapsed(self.start))
    }
}

/// Convenience container bundling the standard scheduler and clock.
#[derive(Clone)]
pub struct StdDriver {
    scheduler: Arc<StdWorkScheduler>,
    clock: Arc<StdClock>,
}

impl StdDriver {
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(StdWorkScheduler::default()),
            clock: Arc::new(StdClock),
        }
    }

    /// Builds a runtime over `host` wired to this driver's scheduler.
    pub fn runtime<H: HostBackend>(&self, host: H) -> Runtime<H> {
        Runtime::with_scheduler(host, self.scheduler.clone())
    }

    pub fn scheduler(&self) -> Arc<StdWorkScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn clock(&self) -> Arc<StdClock> {
        Arc::clone(&self.clock)
    }

    /// Returns whether work was requested since the last poll.
    pub fn take_work_request(&self) -> bool {
        self.scheduler.take_work_request()
    }

    /// Registers a waker invoked when the runtime schedules new work.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    /// Clears any previously registered waker.
    pub fn clear_waker(&self) {
        self.scheduler.clear_waker();
    }

    /// Runs one cooperative slice of the given length against the runtime.
    pub fn pump<H: HostBackend>(
        &self,
        runtime: &mut Runtime<H>,
        slice: Duration,
    ) -> Result<WorkStatus, RenderError> {
        let mut deadline = TimeSliceDeadline::new(slice);
        runtime.run(&mut deadline)
    }
}

impl Default for StdDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdDriver")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use weft_core::{
        component_fn, use_state, Element, MemoryHost, Props, StateSetter, WorkStatus,
    };

    use super::StdDriver;

    thread_local! {
        static STATE_SLOT: RefCell<Option<StateSetter<i32>>> = RefCell::new(None);
    }

    #[test]
    fn std_driver_requests_work_and_rerenders_on_state_change() {
        let body = component_fn(|_props| {
            let (count, set_count) = use_state(0i32)?;
            STATE_SLOT.with(|slot| slot.borrow_mut().replace(set_count));
            Ok(Element::text(format!("{count}")))
        });

        let driver = StdDriver::new();
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let mut runtime = driver.runtime(host);

        runtime.render(
            Element::host("div", Props::new().child(Element::component(&body, Props::new()))),
            container,
        );
        assert!(driver.take_work_request(), "render should request work");
        assert_eq!(
            driver
                .pump(&mut runtime, Duration::from_millis(50))
                .expect("initial render"),
            WorkStatus::Idle
        );

        let setter = STATE_SLOT
            .with(|slot| slot.borrow().clone())
            .expect("setter captured during render");
        setter.set(|count| count + 1);
        assert!(
            driver.take_work_request(),
            "state change should request work"
        );

        while runtime.needs_work() {
            driver
                .pump(&mut runtime, Duration::from_millis(50))
                .expect("re-render after state change");
        }

        let div = runtime.host().children_of(container).unwrap()[0];
        let text = runtime.host().children_of(div).unwrap()[0];
        assert_eq!(runtime.host().text_of(text).unwrap(), Some("1"));
    }
}
