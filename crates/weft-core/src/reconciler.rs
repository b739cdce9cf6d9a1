//! Unit-of-work processing and child diffing.
//!
//! A unit processes one fiber: component fibers run their body and
//! reconcile the single produced child, host fibers materialize their node
//! on first encounter and reconcile their children list. The diff walks the
//! new element list and the old sibling chain in lock-step by index.

use crate::element::{ComponentFn, Element, Props};
use crate::fiber::{EffectTag, Fiber, FiberId, FiberKind};
use crate::host::HostBackend;
use crate::runtime::{ActiveRuntimeGuard, RenderState, Runtime};
use crate::RenderError;

impl<H: HostBackend> Runtime<H> {
    pub(crate) fn perform_unit(&mut self, unit: FiberId) -> Result<(), RenderError> {
        let kind = self.inner.state.borrow().arena.get(unit)?.kind.clone();
        let superseded = match kind {
            FiberKind::Component(body) => self.update_component(unit, body)?,
            FiberKind::Root | FiberKind::Fragment => {
                self.update_container(unit)?;
                false
            }
            FiberKind::Host(_) | FiberKind::Text => {
                self.update_host(unit)?;
                false
            }
        };
        if superseded {
            // A new root was installed mid-unit; the cursor already points
            // into the fresh generation.
            return Ok(());
        }
        let mut state = self.inner.state.borrow_mut();
        state.next_unit = state.next_after(unit)?;
        Ok(())
    }

    /// Runs a component body with the hook cursor reset, then reconciles
    /// the single child it produced. Returns true when a state setter
    /// superseded this generation while the body ran.
    fn update_component(&mut self, unit: FiberId, body: ComponentFn) -> Result<bool, RenderError> {
        let (props, epoch) = {
            let mut state = self.inner.state.borrow_mut();
            let epoch = state.root_epoch;
            state.active_component = Some(unit);
            state.hook_index = 0;
            let fiber = state.arena.get_mut(unit)?;
            fiber.hooks.clear();
            (fiber.props.clone(), epoch)
        };
        // The state cell must not stay borrowed across the body: hooks and
        // state setters re-enter through the active-runtime stack.
        let produced = {
            let _active = ActiveRuntimeGuard::push(self.handle());
            body(&props)
        };
        let superseded = {
            let mut state = self.inner.state.borrow_mut();
            state.active_component = None;
            state.hook_index = 0;
            state.root_epoch != epoch
        };
        let child = produced?;
        if superseded {
            return Ok(true);
        }
        self.reconcile_children(unit, vec![child])?;
        Ok(false)
    }

    /// Ensures a host node exists for the fiber (the root's is supplied by
    /// the caller), then reconciles its children list. New nodes get their
    /// initial props while still detached; structure changes wait for
    /// commit.
    fn update_host(&mut self, unit: FiberId) -> Result<(), RenderError> {
        let create = {
            let state = self.inner.state.borrow();
            let fiber = state.arena.get(unit)?;
            match (fiber.dom, fiber.kind.host_node_kind()) {
                (None, Some(kind)) => Some((kind, fiber.props.clone())),
                _ => None,
            }
        };
        if let Some((kind, props)) = create {
            let node = self.host.create_node(&kind)?;
            self.host.apply_props(node, &Props::new(), &props)?;
            self.inner.state.borrow_mut().arena.get_mut(unit)?.dom = Some(node);
        }
        self.update_container(unit)
    }

    fn update_container(&mut self, unit: FiberId) -> Result<(), RenderError> {
        let children = self.inner.state.borrow().arena.get(unit)?.props.children.clone();
        self.reconcile_children(unit, children)
    }

    fn reconcile_children(
        &mut self,
        unit: FiberId,
        elements: Vec<Element>,
    ) -> Result<(), RenderError> {
        self.inner.state.borrow_mut().reconcile_children(unit, elements)
    }
}

impl RenderState {
    /// Diffs the previous child fiber chain of `wip` against `elements`,
    /// producing the new effect-tagged chain.
    ///
    /// Matching is purely positional: index plus type equality. An old
    /// fiber whose type matches becomes an Update that reuses the host
    /// node; an element with no matching old fiber becomes a Placement; an
    /// old fiber with no matching element is tagged Deletion exactly once
    /// and appended to the pending list. There is no keyed matching, so
    /// reordering same-typed siblings degrades to pairwise updates.
    pub(crate) fn reconcile_children(
        &mut self,
        wip: FiberId,
        elements: Vec<Element>,
    ) -> Result<(), RenderError> {
        let mut old_fiber = match self.arena.get(wip)?.alternate {
            Some(alternate) => self.arena.get(alternate)?.child,
            None => None,
        };
        let mut elements = elements.into_iter();
        let mut prev_sibling: Option<FiberId> = None;
        let mut first = true;

        loop {
            let element = elements.next();
            if element.is_none() && old_fiber.is_none() {
                break;
            }

            let mut new_fiber: Option<FiberId> = None;
            let mut matched_old = false;

            if let (Some(old_id), Some(el)) = (old_fiber, element.as_ref()) {
                let (kind, dom, same_type) = {
                    let old = self.arena.get(old_id)?;
                    (old.kind.clone(), old.dom, old.kind.matches(&el.kind))
                };
                if same_type {
                    matched_old = true;
                    let mut fiber = Fiber::new(kind, el.props.clone());
                    fiber.dom = dom;
                    fiber.parent = Some(wip);
                    fiber.alternate = Some(old_id);
                    fiber.effect = Some(EffectTag::Update);
                    new_fiber = Some(self.allocate(fiber));
                }
            }

            if !matched_old {
                if let Some(el) = element {
                    let mut fiber = Fiber::new(FiberKind::from_element(el.kind), el.props);
                    fiber.parent = Some(wip);
                    fiber.effect = Some(EffectTag::Placement);
                    new_fiber = Some(self.allocate(fiber));
                }
                if let Some(old_id) = old_fiber {
                    self.arena.get_mut(old_id)?.effect = Some(EffectTag::Deletion);
                    self.deletions.push(old_id);
                }
            }

            if let Some(old_id) = old_fiber {
                old_fiber = self.arena.get(old_id)?.sibling;
            }

            if first {
                self.arena.get_mut(wip)?.child = new_fiber;
                first = false;
            } else if let (Some(prev), Some(created)) = (prev_sibling, new_fiber) {
                self.arena.get_mut(prev)?.sibling = Some(created);
            }
            if new_fiber.is_some() {
                prev_sibling = new_fiber;
            }
        }
        Ok(())
    }
}
