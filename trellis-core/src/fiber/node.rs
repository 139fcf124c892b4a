//! Work Nodes
//!
//! This module defines the record that represents one logical tree position
//! during a render pass.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

use super::NodeId;
use crate::element::{ElementType, Node, Props};
use crate::hooks::HookCell;
use crate::host::InstanceId;
use crate::update::SharedQueue;

/// The fixed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    /// The top of a mounted tree. Its state is the rendered desired tree.
    Root,
    /// A host element such as `div`.
    HostElement,
    /// A host text node.
    HostText,
    /// A user component. Its state is its hook chain.
    FunctionComponent,
    /// A grouping node with no host object of its own.
    Fragment,
}

impl WorkTag {
    /// Whether nodes of this kind own a host object.
    pub fn is_host(self) -> bool {
        matches!(self, Self::HostElement | Self::HostText)
    }
}

bitflags! {
    /// Pending host mutations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// Insert the node's host objects into the host tree.
        const PLACEMENT = 1 << 1;
        /// Apply new properties or text content.
        const UPDATE = 1 << 2;
        /// Remove the children queued in `deletions`.
        const CHILD_DELETION = 1 << 4;
    }
}

/// Every flag the commit phase acts on.
pub const MUTATION_MASK: Flags = Flags::PLACEMENT
    .union(Flags::UPDATE)
    .union(Flags::CHILD_DELETION);

/// What a node's `state_node` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateNode {
    #[default]
    None,
    /// The root descriptor of the tree.
    Root,
    /// A host object owned by this position.
    Host(InstanceId),
}

impl StateNode {
    pub fn instance(self) -> Option<InstanceId> {
        match self {
            Self::Host(id) => Some(id),
            _ => None,
        }
    }
}

/// The opaque per-node state.
#[derive(Clone, Default)]
pub enum MemoizedState {
    #[default]
    None,
    /// The desired tree last resolved for the root.
    Element(Node),
    /// A component's local-state cells, in declaration order.
    Hooks(Vec<HookCell>),
}

impl MemoizedState {
    pub fn hooks(&self) -> &[HookCell] {
        match self {
            Self::Hooks(chain) => chain,
            _ => &[],
        }
    }

    pub fn element(&self) -> Node {
        match self {
            Self::Element(node) => node.clone(),
            _ => Node::Empty,
        }
    }
}

impl fmt::Debug for MemoizedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Element(node) => f.debug_tuple("Element").field(node).finish(),
            Self::Hooks(chain) => write!(f, "Hooks({} cells)", chain.len()),
        }
    }
}

/// One logical tree position in one of the two buffers.
///
/// `child` is the owning edge. `parent`, `sibling` and `alternate` are
/// lookups into the arena and never keep a node alive.
#[derive(Debug)]
pub struct WorkNode {
    pub tag: WorkTag,
    pub key: Option<String>,
    pub element_type: Option<ElementType>,
    pub pending_props: Props,
    pub memoized_props: Option<Props>,
    pub memoized_state: MemoizedState,
    pub state_node: StateNode,
    pub update_queue: Option<SharedQueue<Node>>,

    pub parent: Option<NodeId>,
    pub sibling: Option<NodeId>,
    pub child: Option<NodeId>,
    pub index: usize,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: SmallVec<[NodeId; 2]>,

    /// The same position in the other buffer.
    pub alternate: Option<NodeId>,
}

impl WorkNode {
    pub fn new(tag: WorkTag, pending_props: Props, key: Option<String>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::None,
            state_node: StateNode::None,
            update_queue: None,
            parent: None,
            sibling: None,
            child: None,
            index: 0,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: SmallVec::new(),
            alternate: None,
        }
    }

    /// Host type name for host elements.
    pub fn type_name(&self) -> Option<&str> {
        match &self.element_type {
            Some(ElementType::Host(name)) => Some(name),
            _ => None,
        }
    }

    /// Human-readable name, for diagnostics.
    pub fn display_name(&self) -> &str {
        match &self.element_type {
            Some(ElementType::Host(name)) => name,
            Some(ElementType::Component(component)) => component.name(),
            Some(ElementType::Fragment) => "Fragment",
            None => match self.tag {
                WorkTag::Root => "Root",
                WorkTag::HostText => "#text",
                _ => "?",
            },
        }
    }
}
