//! Host-tree boundary: the contract the engine drives, plus an in-memory
//! reference backend for tests, demos, and headless rendering.

use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::element::{EventHandler, PropMap, PropValue, Props, TEXT_PROP};

pub type HostNodeId = usize;

/// What kind of host primitive to allocate for a fiber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostNodeKind {
    Element(String),
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: HostNodeId },
    NotAChild { parent: HostNodeId, child: HostNodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Operations the engine needs from a host tree. Structure is mutated only
/// during commit; node creation and initial prop application happen while a
/// node is still detached.
pub trait HostBackend {
    /// Allocate a new host primitive for the given kind.
    fn create_node(&mut self, kind: &HostNodeKind) -> Result<HostNodeId, HostError>;

    /// Reconcile attribute and event bindings on one node given its
    /// previous and next property mappings. Stale or changed event bindings
    /// must be detached before new ones are attached. `children` is a typed
    /// field on [`Props`] and never reaches this call as a property.
    fn apply_props(&mut self, node: HostNodeId, old: &Props, new: &Props)
        -> Result<(), HostError>;

    fn insert_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;
}

/// One node in the in-memory host tree.
pub struct MemoryNode {
    pub kind: HostNodeKind,
    pub attrs: PropMap<PropValue>,
    listeners: HashMap<String, EventHandler>,
    pub children: Vec<HostNodeId>,
}

impl MemoryNode {
    fn new(kind: HostNodeKind) -> Self {
        Self {
            kind,
            attrs: PropMap::default(),
            listeners: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Text content, for nodes whose content travels in the reserved prop.
    pub fn text(&self) -> Option<&str> {
        match self.attrs.get(TEXT_PROP) {
            Some(PropValue::Text(content)) => Some(content.as_str()),
            _ => None,
        }
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.listeners.contains_key(event)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Host backend holding the whole tree in slot storage. The reference
/// implementation of [`HostBackend`], also useful as a headless target.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Allocates a detached container node for a root render to mount into.
    pub fn create_container(&mut self) -> HostNodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(MemoryNode::new(HostNodeKind::Element("root".to_string()))));
        id
    }

    pub fn node(&self, id: HostNodeId) -> Result<&MemoryNode, HostError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: HostNodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children_of(&self, id: HostNodeId) -> Result<&[HostNodeId], HostError> {
        Ok(&self.node(id)?.children)
    }

    pub fn text_of(&self, id: HostNodeId) -> Result<Option<&str>, HostError> {
        Ok(self.node(id)?.text())
    }

    /// Fires the named listener on a node, the way a host event loop would.
    /// Returns whether a listener was registered for the event.
    pub fn dispatch(&self, id: HostNodeId, event: &str) -> Result<bool, HostError> {
        let handler = {
            let node = self.node(id)?;
            node.listeners.get(event).map(Rc::clone)
        };
        match handler {
            Some(handler) => {
                handler();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn dump_tree(&self, root: Option<HostNodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: HostNodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.nodes.get(id).and_then(Option::as_ref) {
            Some(node) => {
                match &node.kind {
                    HostNodeKind::Element(kind) => {
                        output.push_str(&format!("{indent}[{id}] <{kind}>"));
                        for (name, value) in node.attrs.iter() {
                            output.push_str(&format!(" {name}={value:?}"));
                        }
                        output.push('\n');
                    }
                    HostNodeKind::Text => {
                        output.push_str(&format!(
                            "{indent}[{id}] {:?}\n",
                            node.text().unwrap_or("")
                        ));
                    }
                }
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            None => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }
}

impl HostBackend for MemoryHost {
    fn create_node(&mut self, kind: &HostNodeKind) -> Result<HostNodeId, HostError> {
        let id = self.nodes.len();
        self.nodes.push(Some(MemoryNode::new(kind.clone())));
        Ok(id)
    }

    fn apply_props(
        &mut self,
        node: HostNodeId,
        old: &Props,
        new: &Props,
    ) -> Result<(), HostError> {
        let target = self.node_mut(node)?;

        // Detach stale or changed listeners before anything is attached.
        for (name, old_handler) in old.events() {
            let keep = new
                .event(name)
                .map(|handler| Rc::ptr_eq(handler, old_handler))
                .unwrap_or(false);
            if !keep {
                target.listeners.remove(name);
            }
        }

        // Drop attributes that are gone.
        for (name, _) in old.attrs() {
            if new.get(name).is_none() {
                target.attrs.shift_remove(name);
            }
        }

        // Set new or changed attributes.
        for (name, value) in new.attrs() {
            if old.get(name) != Some(value) {
                target.attrs.insert(name.to_string(), value.clone());
            }
        }

        // Attach new or changed listeners.
        for (name, handler) in new.events() {
            let fresh = old
                .event(name)
                .map(|previous| !Rc::ptr_eq(previous, handler))
                .unwrap_or(true);
            if fresh {
                target.listeners.insert(name.to_string(), Rc::clone(handler));
            }
        }

        Ok(())
    }

    fn insert_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.node(child)?;
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        let node = self.node_mut(parent)?;
        match node.children.iter().position(|id| *id == child) {
            Some(position) => {
                node.children.remove(position);
            }
            None => return Err(HostError::NotAChild { parent, child }),
        }

        // Release the detached subtree; the engine never references removed
        // nodes again.
        let mut stack = vec![child];
        while let Some(id) = stack.pop() {
            if let Some(slot) = self.nodes.get_mut(id) {
                if let Some(node) = slot.take() {
                    stack.extend(node.children);
                }
            }
        }
        Ok(())
    }
}
