//! Fiber nodes: the unit of work and the persistent record of one rendered
//! tree position across generations.

use std::fmt;
use std::rc::Rc;

use crate::element::{ComponentFn, ElementKind, Props};
use crate::hooks::Hook;
use crate::host::{HostNodeId, HostNodeKind};
use crate::RenderError;

pub type FiberId = usize;

/// Mutation instruction computed during reconciliation and consumed by the
/// commit pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectTag {
    Placement,
    Update,
    Deletion,
}

#[derive(Clone)]
pub enum FiberKind {
    /// The mount-point fiber installed by a root render. Owns the caller's
    /// container node and is never created or destroyed by the engine.
    Root,
    Host(String),
    Text,
    Component(ComponentFn),
    Fragment,
}

impl FiberKind {
    pub(crate) fn from_element(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Host(host) => FiberKind::Host(host),
            ElementKind::Text => FiberKind::Text,
            ElementKind::Component(body) => FiberKind::Component(body),
            ElementKind::Fragment => FiberKind::Fragment,
        }
    }

    /// Positional type equality between an existing fiber and the element
    /// now occupying the same index.
    pub(crate) fn matches(&self, element: &ElementKind) -> bool {
        match (self, element) {
            (FiberKind::Host(a), ElementKind::Host(b)) => a == b,
            (FiberKind::Text, ElementKind::Text) => true,
            (FiberKind::Component(a), ElementKind::Component(b)) => Rc::ptr_eq(a, b),
            (FiberKind::Fragment, ElementKind::Fragment) => true,
            _ => false,
        }
    }

    /// Host primitive this fiber materializes, if it owns one.
    pub(crate) fn host_node_kind(&self) -> Option<HostNodeKind> {
        match self {
            FiberKind::Host(kind) => Some(HostNodeKind::Element(kind.clone())),
            FiberKind::Text => Some(HostNodeKind::Text),
            _ => None,
        }
    }
}

impl fmt::Debug for FiberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberKind::Root => write!(f, "Root"),
            FiberKind::Host(kind) => write!(f, "Host({kind:?})"),
            FiberKind::Text => write!(f, "Text"),
            FiberKind::Component(_) => write!(f, "Component"),
            FiberKind::Fragment => write!(f, "Fragment"),
        }
    }
}

/// One tree position in one generation.
///
/// Structural links form a first-child/next-sibling tree; `parent` is a
/// back-reference, never an ownership edge. `alternate` points at the fiber
/// that held the same position in the previously committed generation and
/// is cleared when the generation seals.
pub struct Fiber {
    pub kind: FiberKind,
    pub props: Props,
    pub dom: Option<HostNodeId>,
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub alternate: Option<FiberId>,
    pub effect: Option<EffectTag>,
    pub hooks: Vec<Hook>,
}

impl Fiber {
    pub(crate) fn new(kind: FiberKind, props: Props) -> Self {
        Self {
            kind,
            props,
            dom: None,
            parent: None,
            child: None,
            sibling: None,
            alternate: None,
            effect: None,
            hooks: Vec::new(),
        }
    }
}

/// Slot storage for fibers. Ids are indices; released slots go on a free
/// list and are reused by later generations.
pub(crate) struct FiberArena {
    slots: Vec<Option<Fiber>>,
    free: Vec<FiberId>,
}

impl FiberArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, fiber: Fiber) -> FiberId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(fiber);
                id
            }
            None => {
                self.slots.push(Some(fiber));
                self.slots.len() - 1
            }
        }
    }

    pub(crate) fn get(&self, id: FiberId) -> Result<&Fiber, RenderError> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(RenderError::MissingFiber { id })
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Result<&mut Fiber, RenderError> {
        self.slots
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(RenderError::MissingFiber { id })
    }

    pub(crate) fn release(&mut self, id: FiberId) {
        if let Some(slot) = self.slots.get_mut(id) {
            if slot.take().is_some() {
                self.free.push(id);
            }
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
