//! Positional hook state bound to component fibers.
//!
//! Each hook call reads the record at the current hook index from the
//! previous generation's list, pushes this generation's record at the same
//! index, and advances the shared cursor. Records carry their kind, so a
//! component that changes its hook call sequence between generations is
//! reported as [`RenderError::HookOrderMismatch`] instead of silently
//! binding state to the wrong slot.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::runtime::{with_active_runtime, RuntimeHandle};
use crate::RenderError;

/// Dependency list compared deeply between generations.
pub type Deps = Vec<DepValue>;

/// Dependency value tree. Equality is value-wise and recursive:
/// order-sensitive for lists, key-set-and-value sensitive for maps.
#[derive(Clone, Debug, PartialEq)]
pub enum DepValue {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<DepValue>),
    Map(IndexMap<String, DepValue, ahash::RandomState>),
}

impl From<()> for DepValue {
    fn from(_: ()) -> Self {
        DepValue::Unit
    }
}

impl From<bool> for DepValue {
    fn from(value: bool) -> Self {
        DepValue::Bool(value)
    }
}

impl From<i64> for DepValue {
    fn from(value: i64) -> Self {
        DepValue::Int(value)
    }
}

impl From<i32> for DepValue {
    fn from(value: i32) -> Self {
        DepValue::Int(value as i64)
    }
}

impl From<usize> for DepValue {
    fn from(value: usize) -> Self {
        DepValue::Int(value as i64)
    }
}

impl From<f64> for DepValue {
    fn from(value: f64) -> Self {
        DepValue::Float(value)
    }
}

impl From<&str> for DepValue {
    fn from(value: &str) -> Self {
        DepValue::Text(value.to_string())
    }
}

impl From<String> for DepValue {
    fn from(value: String) -> Self {
        DepValue::Text(value)
    }
}

impl From<Vec<DepValue>> for DepValue {
    fn from(value: Vec<DepValue>) -> Self {
        DepValue::List(value)
    }
}

/// Type-erased functional update queued against a state hook. Returns
/// `None` when the stored state is not of the update's type, in which case
/// the replay skips it.
pub type StateUpdate = Box<dyn Fn(&dyn Any) -> Option<Box<dyn Any>>>;

/// One positional record on a component fiber.
pub enum Hook {
    State {
        value: Rc<dyn Any>,
        queue: Rc<RefCell<Vec<StateUpdate>>>,
    },
    Effect {
        deps: Deps,
    },
    Memo {
        value: Rc<dyn Any>,
        deps: Deps,
    },
    Ref {
        cell: Rc<dyn Any>,
    },
}

impl Hook {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Hook::State { .. } => "state",
            Hook::Effect { .. } => "effect",
            Hook::Memo { .. } => "memo",
            Hook::Ref { .. } => "ref",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook::{}", self.kind_name())
    }
}

fn mismatch(index: usize, expected: &'static str, found: &Hook) -> RenderError {
    RenderError::HookOrderMismatch {
        index,
        expected,
        found: found.kind_name(),
    }
}

/// Enqueues functional updates against one state hook slot and schedules a
/// re-render of the committed tree when called.
pub struct StateSetter<T: 'static> {
    queue: Rc<RefCell<Vec<StateUpdate>>>,
    runtime: RuntimeHandle,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: 'static> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            runtime: self.runtime.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> StateSetter<T> {
    /// Appends an update function to this hook's queue and schedules a
    /// fresh render from the committed root. Updates are folded over the
    /// previous state, in call order, when the component next renders.
    pub fn set(&self, update: impl Fn(&T) -> T + 'static) {
        self.queue.borrow_mut().push(Box::new(move |previous: &dyn Any| {
            previous
                .downcast_ref::<T>()
                .map(|previous| Box::new(update(previous)) as Box<dyn Any>)
        }));
        self.runtime.schedule_update();
    }

    pub fn set_value(&self, value: T)
    where
        T: Clone,
    {
        self.set(move |_| value.clone());
    }
}

/// Per-render state slot. Returns the current value (the previous value
/// with all queued updates folded in) and the setter for this generation.
pub fn use_state<T: Clone + 'static>(initial: T) -> Result<(T, StateSetter<T>), RenderError> {
    with_active_runtime(|handle| {
        let (current, queue) = handle.with_state_mut(|state| {
            let (fiber, index) = state.hook_cursor()?;
            let (mut value, pending): (Rc<dyn Any>, _) = match state.old_hook(fiber, index)? {
                Some(Hook::State { value, queue }) => (Rc::clone(value), Some(Rc::clone(queue))),
                Some(other) => return Err(mismatch(index, "state", other)),
                None => (Rc::new(initial), None),
            };
            if let Some(pending) = pending {
                for update in pending.borrow().iter() {
                    if let Some(next) = update(value.as_ref()) {
                        value = Rc::from(next);
                    }
                }
            }
            let current = value.downcast_ref::<T>().cloned().ok_or(
                RenderError::HookOrderMismatch {
                    index,
                    expected: "state",
                    found: "state of a different type",
                },
            )?;
            let queue = Rc::new(RefCell::new(Vec::new()));
            state.push_hook(
                fiber,
                index,
                Hook::State {
                    value: Rc::new(current.clone()),
                    queue: Rc::clone(&queue),
                },
            )?;
            Ok((current, queue))
        })?;
        Ok((
            current,
            StateSetter {
                queue,
                runtime: handle.clone(),
                _marker: PhantomData,
            },
        ))
    })
}

/// Runs `callback` on first mount, or when `deps` is not deeply equal to
/// the previous generation's list. The callback runs synchronously, after
/// the record is pushed and outside the engine's state borrow, so it may
/// call state setters freely.
pub fn use_effect(deps: Deps, callback: impl FnOnce()) -> Result<(), RenderError> {
    let should_run = with_active_runtime(|handle| {
        handle.with_state_mut(|state| {
            let (fiber, index) = state.hook_cursor()?;
            let mut run = true;
            if let Some(old) = state.old_hook(fiber, index)? {
                match old {
                    Hook::Effect { deps: old_deps } => run = old_deps != &deps,
                    other => return Err(mismatch(index, "effect", other)),
                }
            }
            state.push_hook(fiber, index, Hook::Effect { deps })?;
            Ok(run)
        })
    })?;
    if should_run {
        callback();
    }
    Ok(())
}

/// Recomputes `compute` when `deps` change, otherwise carries the previous
/// value forward unevaluated.
pub fn use_memo<T: Clone + 'static>(
    deps: Deps,
    compute: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    let carried = with_active_runtime(|handle| {
        handle.with_state_mut(|state| {
            let (fiber, index) = state.hook_cursor()?;
            let mut carried: Option<T> = None;
            if let Some(old) = state.old_hook(fiber, index)? {
                match old {
                    Hook::Memo { value, deps: old_deps } => {
                        if old_deps == &deps {
                            carried = Some(value.downcast_ref::<T>().cloned().ok_or(
                                RenderError::HookOrderMismatch {
                                    index,
                                    expected: "memo",
                                    found: "memo of a different type",
                                },
                            )?);
                        }
                    }
                    other => return Err(mismatch(index, "memo", other)),
                }
            }
            if let Some(value) = &carried {
                state.push_hook(
                    fiber,
                    index,
                    Hook::Memo {
                        value: Rc::new(value.clone()),
                        deps: deps.clone(),
                    },
                )?;
            }
            Ok(carried)
        })
    })?;
    if let Some(value) = carried {
        return Ok(value);
    }
    let value = compute();
    with_active_runtime(|handle| {
        handle.with_state_mut(|state| {
            let (fiber, index) = state.hook_cursor()?;
            state.push_hook(
                fiber,
                index,
                Hook::Memo {
                    value: Rc::new(value.clone()),
                    deps,
                },
            )
        })
    })?;
    Ok(value)
}

/// Memoizes a callback value by its dependency list, so the same allocation
/// is handed out while deps are stable.
pub fn use_callback<C: Clone + 'static>(deps: Deps, callback: C) -> Result<C, RenderError> {
    use_memo(deps, move || callback)
}

/// Mutable cell created once on first mount and carried forward unchanged
/// on every later generation.
pub struct RefValue<T: 'static> {
    cell: Rc<RefCell<T>>,
}

impl<T: 'static> Clone for RefValue<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: 'static> RefValue<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.borrow())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.cell.borrow_mut())
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }
}

impl<T: Clone + 'static> RefValue<T> {
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

/// Per-instance mutable cell. `initial` runs only on first mount.
pub fn use_ref<T: 'static>(initial: impl FnOnce() -> T) -> Result<RefValue<T>, RenderError> {
    with_active_runtime(|handle| {
        handle.with_state_mut(|state| {
            let (fiber, index) = state.hook_cursor()?;
            let cell: Rc<dyn Any> = match state.old_hook(fiber, index)? {
                Some(Hook::Ref { cell }) => Rc::clone(cell),
                Some(other) => return Err(mismatch(index, "ref", other)),
                None => Rc::new(RefCell::new(initial())),
            };
            let typed = Rc::clone(&cell).downcast::<RefCell<T>>().map_err(|_| {
                RenderError::HookOrderMismatch {
                    index,
                    expected: "ref",
                    found: "ref of a different type",
                }
            })?;
            state.push_hook(fiber, index, Hook::Ref { cell })?;
            Ok(RefValue { cell: typed })
        })
    })
}
