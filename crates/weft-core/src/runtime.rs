//! Runtime scaffolding: the shared render state, the weak handle state
//! setters re-enter through, and the cooperative work loop.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread_local;
use std::time::Duration;

use crate::element::{Element, Props};
use crate::fiber::{Fiber, FiberArena, FiberId, FiberKind};
use crate::hooks::Hook;
use crate::host::{HostBackend, HostNodeId};
use crate::platform::{Deadline, Unconstrained, WorkScheduler};
use crate::RenderError;

/// Yield once the deadline probe reports less than this much slice left.
pub const YIELD_SLICE: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// All scheduled work was performed and committed.
    Idle,
    /// The time budget ran out with units still pending; call
    /// [`Runtime::run`] again to resume from the saved cursor.
    Yielded,
}

/// No-op scheduler for hosts that poll [`Runtime::needs_work`] themselves.
#[derive(Debug, Default)]
pub struct DefaultScheduler;

impl WorkScheduler for DefaultScheduler {
    fn schedule_work(&self) {}
}

/// Everything being worked on right now: the committed tree, the
/// in-progress tree, pending deletions, the work cursor, and the hook
/// cursor. One instance per [`Runtime`]; never a process global.
pub struct RenderState {
    pub(crate) arena: FiberArena,
    pub(crate) committed_root: Option<FiberId>,
    pub(crate) wip_root: Option<FiberId>,
    pub(crate) deletions: Vec<FiberId>,
    pub(crate) next_unit: Option<FiberId>,
    pub(crate) active_component: Option<FiberId>,
    pub(crate) hook_index: usize,
    pub(crate) committed_allocations: Vec<FiberId>,
    pub(crate) wip_allocations: Vec<FiberId>,
    pub(crate) discarded: Vec<FiberId>,
    pub(crate) root_epoch: u64,
}

impl RenderState {
    pub(crate) fn new() -> Self {
        Self {
            arena: FiberArena::new(),
            committed_root: None,
            wip_root: None,
            deletions: Vec::new(),
            next_unit: None,
            active_component: None,
            hook_index: 0,
            committed_allocations: Vec::new(),
            wip_allocations: Vec::new(),
            discarded: Vec::new(),
            root_epoch: 0,
        }
    }

    pub fn committed_root(&self) -> Option<FiberId> {
        self.committed_root
    }

    pub fn wip_root(&self) -> Option<FiberId> {
        self.wip_root
    }

    pub fn fiber(&self, id: FiberId) -> Option<&Fiber> {
        self.arena.get(id).ok()
    }

    pub fn deletions(&self) -> &[FiberId] {
        &self.deletions
    }

    /// Number of live fibers across all generations still held.
    pub fn live_fibers(&self) -> usize {
        self.arena.live()
    }

    pub(crate) fn allocate(&mut self, fiber: Fiber) -> FiberId {
        let id = self.arena.insert(fiber);
        self.wip_allocations.push(id);
        id
    }

    /// Installs a fresh work-in-progress root describing `element` mounted
    /// at `container`. Any in-flight generation is discarded.
    pub(crate) fn install_root(&mut self, element: Element, container: HostNodeId) {
        self.discard_wip();
        let mut root = Fiber::new(FiberKind::Root, Props::with_children(vec![element]));
        root.dom = Some(container);
        root.alternate = self.committed_root;
        let id = self.allocate(root);
        self.begin_generation(id);
    }

    /// Installs a work-in-progress root re-describing the committed tree:
    /// same declarative description, fresh hook state. Returns false when
    /// nothing has been committed yet, in which case there is nothing to
    /// re-render from.
    pub(crate) fn install_from_committed(&mut self) -> bool {
        let Some(committed) = self.committed_root else {
            return false;
        };
        let (props, dom) = match self.arena.get(committed) {
            Ok(fiber) => (fiber.props.clone(), fiber.dom),
            Err(_) => return false,
        };
        self.discard_wip();
        let mut root = Fiber::new(FiberKind::Root, props);
        root.dom = dom;
        root.alternate = Some(committed);
        let id = self.allocate(root);
        self.begin_generation(id);
        true
    }

    fn begin_generation(&mut self, root: FiberId) {
        self.wip_root = Some(root);
        self.next_unit = Some(root);
        self.deletions.clear();
        self.root_epoch = self.root_epoch.wrapping_add(1);
    }

    /// Abandons the in-flight generation, deferring the frees until the
    /// loop is between units (a unit may still be touching its fibers).
    pub(crate) fn discard_wip(&mut self) {
        self.wip_root = None;
        self.next_unit = None;
        self.discarded.append(&mut self.wip_allocations);
    }

    pub(crate) fn drain_discarded(&mut self) {
        while let Some(id) = self.discarded.pop() {
            self.arena.release(id);
        }
    }

    /// Depth-first successor: the child just produced, else the nearest
    /// following sibling walking up the ancestor chain, else none.
    pub(crate) fn next_after(&self, id: FiberId) -> Result<Option<FiberId>, RenderError> {
        let fiber = self.arena.get(id)?;
        if let Some(child) = fiber.child {
            return Ok(Some(child));
        }
        let mut cursor = id;
        loop {
            let fiber = self.arena.get(cursor)?;
            if let Some(sibling) = fiber.sibling {
                return Ok(Some(sibling));
            }
            match fiber.parent {
                Some(parent) => cursor = parent,
                None => return Ok(None),
            }
        }
    }

    /// Nearest ancestor owning a host node; the target parent for this
    /// fiber's structural mutations.
    pub(crate) fn host_parent_of(&self, id: FiberId) -> Result<Option<HostNodeId>, RenderError> {
        let mut cursor = self.arena.get(id)?.parent;
        while let Some(parent_id) = cursor {
            let parent = self.arena.get(parent_id)?;
            if let Some(node) = parent.dom {
                return Ok(Some(node));
            }
            cursor = parent.parent;
        }
        Ok(None)
    }

    pub(crate) fn hook_cursor(&self) -> Result<(FiberId, usize), RenderError> {
        match self.active_component {
            Some(fiber) => Ok((fiber, self.hook_index)),
            None => Err(RenderError::InvalidHookCall),
        }
    }

    pub(crate) fn old_hook(
        &self,
        fiber: FiberId,
        index: usize,
    ) -> Result<Option<&Hook>, RenderError> {
        let fiber = self.arena.get(fiber)?;
        let Some(alternate) = fiber.alternate else {
            return Ok(None);
        };
        Ok(self.arena.get(alternate)?.hooks.get(index))
    }

    pub(crate) fn push_hook(
        &mut self,
        fiber: FiberId,
        index: usize,
        hook: Hook,
    ) -> Result<(), RenderError> {
        let fiber = self.arena.get_mut(fiber)?;
        if fiber.hooks.len() != index {
            return Err(RenderError::HookOrderMismatch {
                index,
                expected: "sequential slot",
                found: "out-of-order call",
            });
        }
        fiber.hooks.push(hook);
        self.hook_index = index + 1;
        Ok(())
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) scheduler: Arc<dyn WorkScheduler>,
    pub(crate) state: RefCell<RenderState>,
}

/// The engine: owns the host backend and the render state, and drives the
/// cooperative reconcile/commit cycle.
pub struct Runtime<H: HostBackend> {
    pub(crate) host: H,
    pub(crate) inner: Rc<RuntimeInner>,
}

impl<H: HostBackend> Runtime<H> {
    pub fn new(host: H) -> Self {
        Self::with_scheduler(host, Arc::new(DefaultScheduler))
    }

    pub fn with_scheduler(host: H, scheduler: Arc<dyn WorkScheduler>) -> Self {
        Self {
            host,
            inner: Rc::new(RuntimeInner {
                scheduler,
                state: RefCell::new(RenderState::new()),
            }),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Read-only access to the render state, for inspection and tests.
    pub fn with_state<R>(&self, f: impl FnOnce(&RenderState) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// Schedules a root render of `element` into `container`. The sole
    /// entry point for fresh declarative trees; state setters re-enter
    /// through [`RuntimeHandle::schedule_update`] instead.
    pub fn render(&mut self, element: Element, container: HostNodeId) {
        self.inner.state.borrow_mut().install_root(element, container);
        self.inner.scheduler.schedule_work();
    }

    pub fn needs_work(&self) -> bool {
        let state = self.inner.state.borrow();
        state.next_unit.is_some() || state.wip_root.is_some()
    }

    /// Performs units of work until the deadline runs out or the generation
    /// is fully reconciled, in which case it commits exactly once. Any
    /// error aborts the in-flight generation; the committed tree and the
    /// host stay on the previous generation (except for a failure inside
    /// commit itself, which leaves the host indeterminate).
    pub fn run(&mut self, deadline: &mut dyn Deadline) -> Result<WorkStatus, RenderError> {
        loop {
            let next = {
                let mut state = self.inner.state.borrow_mut();
                state.drain_discarded();
                state.next_unit
            };
            let Some(unit) = next else { break };
            if let Err(err) = self.perform_unit(unit) {
                self.abort_generation();
                return Err(err);
            }
            if deadline.time_remaining() < YIELD_SLICE
                && self.inner.state.borrow().next_unit.is_some()
            {
                return Ok(WorkStatus::Yielded);
            }
        }
        let pending = self.inner.state.borrow().wip_root.is_some();
        if pending {
            if let Err(err) = self.commit_root() {
                self.abort_generation();
                return Err(err);
            }
        }
        Ok(WorkStatus::Idle)
    }

    /// Drives the loop with an unconstrained deadline until no work remains.
    pub fn run_to_completion(&mut self) -> Result<(), RenderError> {
        let mut unconstrained = Unconstrained;
        while self.needs_work() {
            self.run(&mut unconstrained)?;
        }
        Ok(())
    }

    fn abort_generation(&mut self) {
        let mut state = self.inner.state.borrow_mut();
        state.discard_wip();
        state.deletions.clear();
        state.active_component = None;
        state.hook_index = 0;
        state.drain_discarded();
    }
}

/// Weak handle to a runtime, held by state setters. All operations are
/// no-ops once the runtime is gone, so late callbacks from torn-down UIs
/// never panic.
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl Clone for RuntimeHandle {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl RuntimeHandle {
    /// Re-renders the committed tree with fresh hook state: installs a new
    /// work-in-progress root pointed at the committed root and asks the
    /// scheduler for a slice. Ignored until a first commit exists.
    pub fn schedule_update(&self) {
        if let Some(inner) = self.0.upgrade() {
            let installed = inner.state.borrow_mut().install_from_committed();
            if installed {
                inner.scheduler.schedule_work();
            }
        }
    }

    pub fn needs_work(&self) -> bool {
        match self.0.upgrade() {
            Some(inner) => {
                let state = inner.state.borrow();
                state.next_unit.is_some() || state.wip_root.is_some()
            }
            None => false,
        }
    }

    pub(crate) fn with_state_mut<R>(
        &self,
        f: impl FnOnce(&mut RenderState) -> Result<R, RenderError>,
    ) -> Result<R, RenderError> {
        match self.0.upgrade() {
            Some(inner) => f(&mut inner.state.borrow_mut()),
            None => Err(RenderError::InvalidHookCall),
        }
    }
}

thread_local! {
    static ACTIVE_RUNTIMES: RefCell<Vec<RuntimeHandle>> = RefCell::new(Vec::new());
}

/// Resolves the runtime whose component body is currently executing. Hook
/// functions fail with [`RenderError::InvalidHookCall`] outside that window.
pub(crate) fn with_active_runtime<R>(
    f: impl FnOnce(&RuntimeHandle) -> Result<R, RenderError>,
) -> Result<R, RenderError> {
    let handle = ACTIVE_RUNTIMES.with(|stack| stack.borrow().last().cloned());
    match handle {
        Some(handle) => f(&handle),
        None => Err(RenderError::InvalidHookCall),
    }
}

pub(crate) struct ActiveRuntimeGuard;

impl ActiveRuntimeGuard {
    pub(crate) fn push(handle: RuntimeHandle) -> Self {
        ACTIVE_RUNTIMES.with(|stack| stack.borrow_mut().push(handle));
        Self
    }
}

impl Drop for ActiveRuntimeGuard {
    fn drop(&mut self) {
        ACTIVE_RUNTIMES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
