use std::cell::RefCell;
use std::rc::Rc;

use super::{new_runtime, SliceBudget};
use crate::collections::map::HashSet;
use crate::element::{Element, Props};
use crate::fiber::{EffectTag, Fiber, FiberKind};
use crate::host::{HostBackend, HostError, HostNodeId, HostNodeKind, MemoryHost};
use crate::runtime::{RenderState, Runtime, WorkStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Create,
    Props,
    Insert,
    Remove,
}

struct RecordingHost {
    inner: MemoryHost,
    ops: Rc<RefCell<Vec<Op>>>,
}

impl RecordingHost {
    fn count(&self, op: Op) -> usize {
        self.ops.borrow().iter().filter(|entry| **entry == op).count()
    }
}

impl HostBackend for RecordingHost {
    fn create_node(&mut self, kind: &HostNodeKind) -> Result<HostNodeId, HostError> {
        self.ops.borrow_mut().push(Op::Create);
        self.inner.create_node(kind)
    }

    fn apply_props(
        &mut self,
        node: HostNodeId,
        old: &Props,
        new: &Props,
    ) -> Result<(), HostError> {
        self.ops.borrow_mut().push(Op::Props);
        self.inner.apply_props(node, old, new)
    }

    fn insert_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.ops.borrow_mut().push(Op::Insert);
        self.inner.insert_child(parent, child)
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.ops.borrow_mut().push(Op::Remove);
        self.inner.remove_child(parent, child)
    }
}

fn recording_runtime() -> (Runtime<RecordingHost>, HostNodeId) {
    let mut inner = MemoryHost::new();
    let container = inner.create_container();
    let host = RecordingHost {
        inner,
        ops: Rc::new(RefCell::new(Vec::new())),
    };
    (Runtime::new(host), container)
}

fn committed_effects(state: &RenderState) -> Vec<EffectTag> {
    let mut out = Vec::new();
    let Some(root) = state.committed_root() else {
        return out;
    };
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let fiber = state.fiber(id).expect("committed fiber");
        if let Some(sibling) = fiber.sibling {
            stack.push(sibling);
        }
        if let Some(child) = fiber.child {
            stack.push(child);
        }
        if id != root {
            out.push(fiber.effect.expect("effect tag"));
        }
    }
    out
}

fn list_tree() -> Element {
    Element::host(
        "div",
        Props::new()
            .attr("id", "list")
            .child(Element::text("a"))
            .child(Element::text("b"))
            .child(Element::text("c")),
    )
}

#[test]
fn mount_builds_host_tree() {
    let (mut runtime, container) = new_runtime();
    runtime.render(list_tree(), container);
    runtime.run_to_completion().unwrap();

    let children = runtime.host().children_of(container).unwrap();
    assert_eq!(children.len(), 1);
    let div = children[0];
    let texts = runtime.host().children_of(div).unwrap().to_vec();
    assert_eq!(texts.len(), 3);
    assert_eq!(runtime.host().text_of(texts[0]).unwrap(), Some("a"));
    assert_eq!(runtime.host().text_of(texts[2]).unwrap(), Some("c"));
    assert!(runtime.host().dump_tree(Some(container)).contains("<div>"));
}

#[test]
fn rerender_of_unchanged_tree_is_all_updates() {
    let (mut runtime, container) = new_runtime();
    runtime.render(list_tree(), container);
    runtime.run_to_completion().unwrap();
    let div = runtime.host().children_of(container).unwrap()[0];
    let texts_before = runtime.host().children_of(div).unwrap().to_vec();
    let nodes_before = runtime.host().len();

    runtime.render(list_tree(), container);
    runtime.run_to_completion().unwrap();

    let effects = runtime.with_state(committed_effects);
    assert!(!effects.is_empty());
    assert!(effects.iter().all(|tag| *tag == EffectTag::Update));

    let div_after = runtime.host().children_of(container).unwrap()[0];
    assert_eq!(div_after, div);
    assert_eq!(runtime.host().children_of(div).unwrap(), &texts_before[..]);
    assert_eq!(runtime.host().len(), nodes_before);
}

#[test]
fn trailing_sibling_is_deleted_exactly_once() {
    let (mut runtime, container) = recording_runtime();
    runtime.render(list_tree(), container);
    runtime.run_to_completion().unwrap();
    let div = runtime.host().inner.children_of(container).unwrap()[0];
    let texts_before = runtime.host().inner.children_of(div).unwrap().to_vec();

    let shorter = Element::host(
        "div",
        Props::new()
            .attr("id", "list")
            .child(Element::text("a"))
            .child(Element::text("b")),
    );
    runtime.render(shorter, container);
    runtime.run_to_completion().unwrap();

    assert_eq!(runtime.host().count(Op::Remove), 1);
    let texts_after = runtime.host().inner.children_of(div).unwrap().to_vec();
    assert_eq!(texts_after, texts_before[..2].to_vec());
}

#[test]
fn type_mismatch_replaces_instead_of_updating() {
    let (mut runtime, container) = recording_runtime();
    runtime.render(
        Element::host("div", Props::new().child(Element::host("span", Props::new()))),
        container,
    );
    runtime.run_to_completion().unwrap();
    let div = runtime.host().inner.children_of(container).unwrap()[0];
    let span = runtime.host().inner.children_of(div).unwrap()[0];

    runtime.render(
        Element::host("div", Props::new().child(Element::host("p", Props::new()))),
        container,
    );
    runtime.run_to_completion().unwrap();

    let replacement = runtime.host().inner.children_of(div).unwrap()[0];
    assert_ne!(replacement, span);
    assert_eq!(runtime.host().count(Op::Remove), 1);
    assert!(runtime.host().inner.node(span).is_err());

    // The replacement's committed fiber is a Placement, never an Update.
    runtime.with_state(|state| {
        let root = state.committed_root().unwrap();
        let div_fiber = state.fiber(root).unwrap().child.unwrap();
        let child = state.fiber(div_fiber).unwrap().child.unwrap();
        assert_eq!(state.fiber(child).unwrap().effect, Some(EffectTag::Placement));
    });
}

#[test]
fn host_structure_is_untouched_until_commit() {
    let (mut runtime, container) = new_runtime();
    runtime.render(list_tree(), container);

    let mut yields = 0;
    loop {
        match runtime.run(&mut SliceBudget { extra: 0 }).unwrap() {
            WorkStatus::Yielded => {
                yields += 1;
                assert!(runtime.host().children_of(container).unwrap().is_empty());
            }
            WorkStatus::Idle => break,
        }
    }
    // Units: root, div, and three text fibers; the loop yields after each
    // unit except the last, which flows into the commit.
    assert_eq!(yields, 4);
    assert_eq!(runtime.host().children_of(container).unwrap().len(), 1);
}

#[test]
fn yielded_loop_resumes_without_reprocessing() {
    let (mut runtime, container) = recording_runtime();
    runtime.render(list_tree(), container);

    loop {
        if runtime.run(&mut SliceBudget { extra: 0 }).unwrap() == WorkStatus::Idle {
            break;
        }
    }
    // One node per host fiber: the div and three texts, created once each.
    assert_eq!(runtime.host().count(Op::Create), 4);
    assert_eq!(runtime.host().inner.len(), 5);
}

#[test]
fn superseding_render_discards_in_flight_generation() {
    let (mut runtime, container) = new_runtime();
    runtime.render(list_tree(), container);
    // Process only the root unit, then replace the whole description.
    assert_eq!(
        runtime.run(&mut SliceBudget { extra: 0 }).unwrap(),
        WorkStatus::Yielded
    );
    runtime.render(
        Element::host("span", Props::new().child(Element::text("solo"))),
        container,
    );
    runtime.run_to_completion().unwrap();

    let children = runtime.host().children_of(container).unwrap();
    assert_eq!(children.len(), 1);
    let span = children[0];
    let text = runtime.host().children_of(span).unwrap()[0];
    assert_eq!(runtime.host().text_of(text).unwrap(), Some("solo"));
    // Only the committed generation is still held: root, span, text.
    assert_eq!(runtime.with_state(|state| state.live_fibers()), 3);
}

#[test]
fn steady_state_rerenders_do_not_grow_the_arena() {
    let (mut runtime, container) = new_runtime();
    runtime.render(list_tree(), container);
    runtime.run_to_completion().unwrap();
    let live = runtime.with_state(|state| state.live_fibers());

    for _ in 0..5 {
        runtime.render(list_tree(), container);
        runtime.run_to_completion().unwrap();
        assert_eq!(runtime.with_state(|state| state.live_fibers()), live);
    }
}

#[test]
fn fragment_splices_children_into_host_parent() {
    let (mut runtime, container) = recording_runtime();
    let fragmented = Element::host(
        "div",
        Props::new().child(Element::fragment(vec![
            Element::text("a"),
            Element::text("b"),
        ])),
    );
    runtime.render(fragmented, container);
    runtime.run_to_completion().unwrap();

    let div = runtime.host().inner.children_of(container).unwrap()[0];
    assert_eq!(runtime.host().inner.children_of(div).unwrap().len(), 2);

    // Deleting the fragment removes every host descendant it spliced in.
    runtime.render(Element::host("div", Props::new()), container);
    runtime.run_to_completion().unwrap();
    assert_eq!(runtime.host().count(Op::Remove), 2);
    assert!(runtime.host().inner.children_of(div).unwrap().is_empty());
}

struct FailingHost {
    inner: MemoryHost,
    fail_inserts: bool,
}

impl HostBackend for FailingHost {
    fn create_node(&mut self, kind: &HostNodeKind) -> Result<HostNodeId, HostError> {
        self.inner.create_node(kind)
    }

    fn apply_props(
        &mut self,
        node: HostNodeId,
        old: &Props,
        new: &Props,
    ) -> Result<(), HostError> {
        self.inner.apply_props(node, old, new)
    }

    fn insert_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        if self.fail_inserts {
            return Err(HostError::Missing { id: parent });
        }
        self.inner.insert_child(parent, child)
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.inner.remove_child(parent, child)
    }
}

#[test]
fn host_failure_aborts_the_render_cycle() {
    let mut inner = MemoryHost::new();
    let container = inner.create_container();
    let host = FailingHost {
        inner,
        fail_inserts: true,
    };
    let mut runtime = Runtime::new(host);
    runtime.render(Element::host("div", Props::new()), container);

    let err = runtime.run_to_completion().unwrap_err();
    assert!(matches!(err, crate::RenderError::Host(_)));
    // The failed generation is dropped rather than retried.
    assert!(!runtime.needs_work());
    assert!(runtime.with_state(|state| state.committed_root().is_none()));
}

fn host_fiber(state: &mut RenderState, kind: &str, dom: Option<HostNodeId>) -> crate::FiberId {
    let mut fiber = Fiber::new(FiberKind::Host(kind.to_string()), Props::new());
    fiber.dom = dom;
    state.allocate(fiber)
}

#[test]
fn diff_tags_trailing_removal() {
    let mut state = RenderState::new();
    let old_parent = host_fiber(&mut state, "div", Some(0));
    let a = host_fiber(&mut state, "a", Some(10));
    let b = host_fiber(&mut state, "b", Some(11));
    let c = host_fiber(&mut state, "c", Some(12));
    state.arena.get_mut(old_parent).unwrap().child = Some(a);
    state.arena.get_mut(a).unwrap().sibling = Some(b);
    state.arena.get_mut(b).unwrap().sibling = Some(c);
    for id in [a, b, c] {
        state.arena.get_mut(id).unwrap().parent = Some(old_parent);
    }

    let wip = host_fiber(&mut state, "div", Some(0));
    state.arena.get_mut(wip).unwrap().alternate = Some(old_parent);

    state
        .reconcile_children(
            wip,
            vec![
                Element::host("a", Props::new()),
                Element::host("b", Props::new()),
            ],
        )
        .unwrap();

    assert_eq!(state.deletions(), &[c]);
    let unique: HashSet<_> = state.deletions().iter().copied().collect();
    assert_eq!(unique.len(), state.deletions().len());
    assert_eq!(state.fiber(c).unwrap().effect, Some(EffectTag::Deletion));

    let new_a = state.fiber(wip).unwrap().child.unwrap();
    let fiber_a = state.fiber(new_a).unwrap();
    assert_eq!(fiber_a.effect, Some(EffectTag::Update));
    assert_eq!(fiber_a.alternate, Some(a));
    assert_eq!(fiber_a.dom, Some(10));
    let new_b = fiber_a.sibling.unwrap();
    let fiber_b = state.fiber(new_b).unwrap();
    assert_eq!(fiber_b.effect, Some(EffectTag::Update));
    assert_eq!(fiber_b.dom, Some(11));
    assert_eq!(fiber_b.sibling, None);
}

#[test]
fn diff_replaces_on_type_mismatch() {
    let mut state = RenderState::new();
    let old_parent = host_fiber(&mut state, "div", Some(0));
    let old_child = host_fiber(&mut state, "a", Some(10));
    state.arena.get_mut(old_parent).unwrap().child = Some(old_child);
    state.arena.get_mut(old_child).unwrap().parent = Some(old_parent);

    let wip = host_fiber(&mut state, "div", Some(0));
    state.arena.get_mut(wip).unwrap().alternate = Some(old_parent);

    state
        .reconcile_children(wip, vec![Element::host("b", Props::new())])
        .unwrap();

    assert_eq!(state.deletions(), &[old_child]);
    let replacement = state.fiber(wip).unwrap().child.unwrap();
    let fiber = state.fiber(replacement).unwrap();
    assert_eq!(fiber.effect, Some(EffectTag::Placement));
    assert_eq!(fiber.alternate, None);
    assert_eq!(fiber.dom, None);
}
