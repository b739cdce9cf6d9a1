#![doc = r"Incremental fiber-based rendering runtime for declarative host trees.

Given a declarative tree description, the runtime computes the minimal set
of host-tree mutations to bring a persistent target in sync with it. The
computation is cooperative: units of work run against a time budget and the
loop resumes from its saved cursor, while a two-phase render/commit protocol
keeps partially applied updates from ever being observed. Components hold
state across re-renders through a positional hook mechanism."]

pub mod collections;
mod commit;
pub mod element;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod platform;
mod reconciler;
pub mod runtime;

pub use element::{
    component_fn, ComponentFn, Element, ElementKind, EventHandler, PropMap, PropValue, Props,
    TEXT_PROP,
};
pub use fiber::{EffectTag, Fiber, FiberId, FiberKind};
pub use hooks::{
    use_callback, use_effect, use_memo, use_ref, use_state, DepValue, Deps, Hook, RefValue,
    StateSetter,
};
pub use host::{HostBackend, HostError, HostNodeId, HostNodeKind, MemoryHost, MemoryNode};
pub use platform::{Clock, Deadline, Unconstrained, WorkScheduler};
pub use runtime::{
    DefaultScheduler, RenderState, Runtime, RuntimeHandle, WorkStatus, YIELD_SLICE,
};

use std::fmt;

/// Errors surfaced by the render and commit phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A hook was invoked with no component fiber being processed.
    InvalidHookCall,
    /// Hook slots disagree in shape between generations: the component
    /// changed its hook call sequence. Components must call hooks
    /// unconditionally, in the same order, on every render.
    HookOrderMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    /// A host-contract operation failed.
    Host(HostError),
    /// An internal tree link resolved to a released fiber.
    MissingFiber { id: FiberId },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InvalidHookCall => {
                write!(f, "hook invoked outside a component render")
            }
            RenderError::HookOrderMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "hook slot {index} expected {expected}, found {found}"
            ),
            RenderError::Host(err) => write!(f, "host backend: {err}"),
            RenderError::MissingFiber { id } => write!(f, "fiber {id} missing"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}

/// Builds a dependency list for the dependency-tracking hooks.
///
/// ```
/// # use weft_core::deps;
/// let a = deps![1, "label"];
/// let b = deps![1, "label"];
/// assert_eq!(a, b);
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        ::std::vec::Vec::<$crate::DepValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::DepValue::from($value)),+]
    };
}

#[cfg(test)]
mod tests;
