//! Desired Trees
//!
//! The immutable description of what the UI should look like. A fresh
//! description is produced on every render and consumed by reconciliation;
//! nothing here is retained once it has been copied into a work node.
//!
//! # Shapes
//!
//! A [`Node`] is one of:
//!
//! - `Empty`: render nothing
//! - `Text`: a bare string (or number) rendered as a host text node
//! - `Element`: a host element, a component invocation or a fragment
//! - `List`: several sibling nodes, diffed by key or position
//!
//! Element children travel in the reserved `children` property, exactly like
//! any other property.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::RenderError;
use crate::hooks::Hooks;

/// Name of the property that carries an element's children.
pub const CHILDREN: &str = "children";

/// Name of the property that carries a text node's content.
pub const CONTENT: &str = "content";

/// A callback stored in a property bag, for the event layer to invoke.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn() + Send + Sync>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Node(Node),
    Handler(Handler),
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Node> for PropValue {
    fn from(value: Node) -> Self {
        Self::Node(value)
    }
}

impl From<Element> for PropValue {
    fn from(value: Element) -> Self {
        Self::Node(Node::Element(value))
    }
}

impl From<Handler> for PropValue {
    fn from(value: Handler) -> Self {
        Self::Handler(value)
    }
}

/// An ordered, cheaply clonable property bag.
///
/// Clones share storage; equality short-circuits on shared storage and
/// otherwise compares content.
#[derive(Debug, Clone, Default)]
pub struct Props(Arc<IndexMap<String, PropValue>>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text node properties: `{ content }`.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new().with(CONTENT, content.into())
    }

    /// Return a bag with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        Arc::make_mut(&mut self.0).insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both bags share storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether both bags agree on everything except `children`.
    ///
    /// Children are reconciled separately, so they never make a host
    /// element itself dirty.
    pub fn same_attributes(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let attributes = |props: &Self| props.iter().filter(|(name, _)| *name != CHILDREN).count();
        attributes(self) == attributes(other)
            && self
                .iter()
                .filter(|(name, _)| *name != CHILDREN)
                .all(|(name, value)| other.get(name) == Some(value))
    }

    /// The `content` of a text node, if present.
    pub fn content(&self) -> Option<&str> {
        match self.get(CONTENT) {
            Some(PropValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Interpret the reserved `children` entry as a desired child tree.
    ///
    /// Strings and numbers become text. Shapes that cannot be rendered are
    /// reported and treated as no children.
    pub fn children(&self) -> Node {
        match self.get(CHILDREN) {
            None | Some(PropValue::Null) => Node::Empty,
            Some(PropValue::Node(node)) => node.clone(),
            Some(PropValue::Str(s)) => Node::Text(s.clone()),
            Some(PropValue::Int(i)) => Node::Text(i.to_string()),
            Some(PropValue::Float(f)) => Node::Text(f.to_string()),
            Some(other) => {
                tracing::warn!(value = ?other, "unrecognized child shape, rendering nothing");
                Node::Empty
            }
        }
    }
}

impl PartialEq for Props {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

/// Signature of a component's render function.
pub type RenderFn = dyn Fn(&Props, &mut Hooks<'_>) -> Result<Node, RenderError> + Send + Sync;

/// A named render function. Identity is the function allocation, so clone
/// a component rather than rebuilding it when its state must survive.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    render: Arc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&Props, &mut Hooks<'_>) -> Result<Node, RenderError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            render: Arc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, props: &Props, hooks: &mut Hooks<'_>) -> Result<Node, RenderError> {
        (self.render)(props, hooks)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// What an element instantiates.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    /// A host element, by type name (`"div"`).
    Host(String),
    Component(Component),
    Fragment,
}

/// One element of a desired tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementType,
    pub key: Option<String>,
    pub props: Props,
}

impl Element {
    pub fn host(type_name: &str) -> Self {
        Self::of(ElementType::Host(type_name.to_owned()))
    }

    pub fn component(component: &Component) -> Self {
        Self::of(ElementType::Component(component.clone()))
    }

    pub fn fragment() -> Self {
        Self::of(ElementType::Fragment)
    }

    fn of(kind: ElementType) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props = self.props.with(name, value);
        self
    }

    pub fn with_child(self, child: impl Into<Node>) -> Self {
        self.with_prop(CHILDREN, PropValue::Node(child.into()))
    }

    pub fn with_children<I, N>(self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.with_child(Node::List(children.into_iter().map(Into::into).collect()))
    }
}

/// A desired child tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(String),
    Element(Element),
    List(Vec<Node>),
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Self {
        Self::List(nodes)
    }
}
