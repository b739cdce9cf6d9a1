//! Declarative tree descriptions consumed by the reconciler.
//!
//! An [`Element`] is a cheap, immutable description of one desired tree
//! position: a host primitive, a text leaf, a component invocation, or a
//! fragment splice. Reconciliation diffs these descriptions against the
//! previously committed fiber chain to decide what the host tree needs.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::RenderError;

/// Ordered map used for props. Iteration order is insertion order, so prop
/// application and diffing stay deterministic.
pub type PropMap<V> = IndexMap<String, V, ahash::RandomState>;

/// Reserved prop carrying a text fiber's content.
pub const TEXT_PROP: &str = "text";

/// A component body. Identity is the `Rc` allocation: clone one shared
/// value into every element that should reconcile as the same component.
/// Wrapping the same function in `Rc::new` twice produces two distinct
/// component types.
pub type ComponentFn = Rc<dyn Fn(&Props) -> Result<Element, RenderError>>;

/// Event callback registered on a host node. Identity (`Rc::ptr_eq`) is the
/// change signal: a handler rebuilt on a later render counts as changed and
/// gets rebound.
pub type EventHandler = Rc<dyn Fn()>;

/// Wraps a component body in the shared allocation that serves as its type.
pub fn component_fn(
    body: impl Fn(&Props) -> Result<Element, RenderError> + 'static,
) -> ComponentFn {
    Rc::new(body)
}

#[derive(Clone)]
pub enum ElementKind {
    /// Host primitive of the given kind (for a DOM-like host, a tag name).
    Host(String),
    /// Text leaf; content travels in the reserved [`TEXT_PROP`] prop.
    Text,
    /// Function component, compared between generations by `Rc::ptr_eq`.
    Component(ComponentFn),
    /// Children splice with no host node of its own.
    Fragment,
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(kind) => write!(f, "Host({kind:?})"),
            ElementKind::Text => write!(f, "Text"),
            ElementKind::Component(_) => write!(f, "Component"),
            ElementKind::Fragment => write!(f, "Fragment"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(value) => write!(f, "{value}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Property mapping for one element: attributes, event handlers, and the
/// ordered child descriptions. `children` is a typed field rather than a
/// reserved key, so it can never leak into attribute diffing.
#[derive(Clone, Default)]
pub struct Props {
    attrs: PropMap<PropValue>,
    events: PropMap<EventHandler>,
    pub children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: Vec<Element>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, handler: impl Fn() + 'static) -> Self {
        self.events.insert(event.into(), Rc::new(handler));
        self
    }

    /// Registers a pre-built handler, letting callers share one allocation
    /// across renders so the binding is not churned on every update.
    pub fn on_handler(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.events.insert(event.into(), handler);
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    pub fn event(&self, name: &str) -> Option<&EventHandler> {
        self.events.get(name)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attrs.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &EventHandler)> {
        self.events.iter().map(|(name, handler)| (name.as_str(), handler))
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("children", &self.children.len())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub props: Props,
}

impl Element {
    pub fn host(kind: impl Into<String>, props: Props) -> Self {
        Self {
            kind: ElementKind::Host(kind.into()),
            props,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Text,
            props: Props::new().attr(TEXT_PROP, content.into()),
        }
    }

    pub fn component(body: &ComponentFn, props: Props) -> Self {
        Self {
            kind: ElementKind::Component(Rc::clone(body)),
            props,
        }
    }

    pub fn fragment(children: Vec<Element>) -> Self {
        Self {
            kind: ElementKind::Fragment,
            props: Props::with_children(children),
        }
    }
}
