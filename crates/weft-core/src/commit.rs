//! Commit phase: applies the effect-tagged generation to the host tree in
//! one uninterrupted pass.
//!
//! Deletions first, then a pre-order walk of the in-progress tree. The host
//! observes either the whole previous generation or the whole new one;
//! there is no partial-commit recovery if the host contract itself fails.

use std::mem;

use crate::element::Props;
use crate::fiber::{EffectTag, FiberId};
use crate::host::{HostBackend, HostNodeId};
use crate::runtime::Runtime;
use crate::RenderError;

enum HostOp {
    Insert { parent: HostNodeId, node: HostNodeId },
    Update { node: HostNodeId, old: Props, new: Props },
}

impl<H: HostBackend> Runtime<H> {
    pub(crate) fn commit_root(&mut self) -> Result<(), RenderError> {
        let deletions = {
            let mut state = self.inner.state.borrow_mut();
            mem::take(&mut state.deletions)
        };
        for fiber in deletions {
            self.commit_deletion(fiber)?;
        }

        let start = {
            let state = self.inner.state.borrow();
            match state.wip_root {
                Some(root) => state.arena.get(root)?.child,
                None => None,
            }
        };
        // Explicit stack, child before sibling: pre-order without recursion
        // so deep trees cannot overflow.
        let mut stack: Vec<FiberId> = Vec::new();
        if let Some(first) = start {
            stack.push(first);
        }
        while let Some(id) = stack.pop() {
            if let Some(op) = self.plan_mutation(id)? {
                match op {
                    HostOp::Insert { parent, node } => self.host.insert_child(parent, node)?,
                    HostOp::Update { node, old, new } => {
                        self.host.apply_props(node, &old, &new)?
                    }
                }
            }
            let (child, sibling) = {
                let state = self.inner.state.borrow();
                let fiber = state.arena.get(id)?;
                (fiber.child, fiber.sibling)
            };
            if let Some(sibling) = sibling {
                stack.push(sibling);
            }
            if let Some(child) = child {
                stack.push(child);
            }
        }

        // Seal the generation: the new tree becomes current and the
        // superseded one is released. Alternate links are cleared first so
        // nothing can follow them into reused slots.
        let mut state = self.inner.state.borrow_mut();
        for id in state.wip_allocations.clone() {
            if let Ok(fiber) = state.arena.get_mut(id) {
                fiber.alternate = None;
            }
        }
        let superseded = mem::take(&mut state.committed_allocations);
        for id in superseded {
            state.arena.release(id);
        }
        state.committed_allocations = mem::take(&mut state.wip_allocations);
        state.committed_root = state.wip_root.take();
        state.next_unit = None;
        Ok(())
    }

    fn plan_mutation(&self, id: FiberId) -> Result<Option<HostOp>, RenderError> {
        let state = self.inner.state.borrow();
        let fiber = state.arena.get(id)?;
        let op = match (fiber.effect, fiber.dom) {
            (Some(EffectTag::Placement), Some(node)) => state
                .host_parent_of(id)?
                .map(|parent| HostOp::Insert { parent, node }),
            (Some(EffectTag::Update), Some(node)) => {
                let old = match fiber.alternate {
                    Some(alternate) => state.arena.get(alternate)?.props.clone(),
                    None => Props::new(),
                };
                Some(HostOp::Update {
                    node,
                    old,
                    new: fiber.props.clone(),
                })
            }
            _ => None,
        };
        Ok(op)
    }

    /// Removes the host nodes a deleted fiber is responsible for. A fiber
    /// without a host node delegates to the topmost host-owning descendants
    /// (a fragment may have several).
    fn commit_deletion(&mut self, fiber: FiberId) -> Result<(), RenderError> {
        let removals = {
            let state = self.inner.state.borrow();
            let Some(parent) = state.host_parent_of(fiber)? else {
                return Ok(());
            };
            let mut removals: Vec<(HostNodeId, HostNodeId)> = Vec::new();
            let mut stack = vec![fiber];
            while let Some(id) = stack.pop() {
                let entry = state.arena.get(id)?;
                if let Some(node) = entry.dom {
                    removals.push((parent, node));
                } else {
                    let mut child = entry.child;
                    while let Some(child_id) = child {
                        stack.push(child_id);
                        child = state.arena.get(child_id)?.sibling;
                    }
                }
            }
            removals
        };
        for (parent, node) in removals {
            self.host.remove_child(parent, node)?;
        }
        Ok(())
    }
}
