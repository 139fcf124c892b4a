//! Work Node Arena
//!
//! Every work node of a root lives in one generational arena. Tree edges
//! are [`NodeId`]s, so the cyclic parent/child/sibling/alternate graph never
//! forms an ownership cycle, and an id that outlives its node is detected
//! instead of aliasing whatever reuses the slot.
//!
//! # The Dual Buffer
//!
//! Each logical position has at most two nodes: the committed one
//! ("current") and the one being computed ("work in progress"), linked both
//! ways through `alternate`. [`FiberArena::create_work_in_progress`] reuses
//! the alternate whenever one exists, so re-rendering a position never
//! allocates after its second render.
//!
//! # Passes
//!
//! The arena remembers which nodes were freshly allocated since the last
//! [`FiberArena::begin_pass`]. Abandoning a render attempt releases exactly
//! those, and unhooks them from their committed counterparts.

use std::ops::{Index, IndexMut};

use slotmap::SlotMap;

use super::node::{Flags, MemoizedState, StateNode, WorkNode, WorkTag};
use super::NodeId;
use crate::element::{CHILDREN, Element, ElementType, Node, PropValue, Props};
use crate::update::SharedQueue;

/// Storage for every work node of one root.
#[derive(Debug, Default)]
pub struct FiberArena {
    nodes: SlotMap<NodeId, WorkNode>,
    pass_allocations: Vec<NodeId>,
    total_allocations: u64,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, node: WorkNode) -> NodeId {
        let id = self.nodes.insert(node);
        self.pass_allocations.push(id);
        self.total_allocations += 1;
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&WorkNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut WorkNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes across both buffers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes allocated over the arena's lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations
    }

    /// The root node of a new tree, fed by `queue`. It has no alternate
    /// until the first render.
    pub fn create_host_root(&mut self, queue: SharedQueue<Node>) -> NodeId {
        let mut root = WorkNode::new(WorkTag::Root, Props::new(), None);
        root.state_node = StateNode::Root;
        root.update_queue = Some(queue);
        root.memoized_state = MemoizedState::Element(Node::Empty);
        let id = self.nodes.insert(root);
        self.total_allocations += 1;
        id
    }

    /// The work-in-progress counterpart of `current`, primed with `pending_props`.
    ///
    /// Allocates only when `current` has never had an alternate.
    pub fn create_work_in_progress(&mut self, current: NodeId, pending_props: Props) -> NodeId {
        let alternate = self[current].alternate;
        let wip = match alternate {
            None => {
                let source = &self[current];
                let mut node = WorkNode::new(source.tag, pending_props, source.key.clone());
                node.alternate = Some(current);
                let id = self.allocate(node);
                self[current].alternate = Some(id);
                id
            }
            Some(existing) => {
                let node = &mut self[existing];
                node.pending_props = pending_props;
                node.flags = Flags::empty();
                node.subtree_flags = Flags::empty();
                node.deletions.clear();
                existing
            }
        };

        let (element_type, update_queue, child, memoized_props, memoized_state, state_node) = {
            let source = &self[current];
            (
                source.element_type.clone(),
                source.update_queue.clone(),
                source.child,
                source.memoized_props.clone(),
                source.memoized_state.clone(),
                source.state_node,
            )
        };
        let node = &mut self[wip];
        node.element_type = element_type;
        node.update_queue = update_queue;
        node.child = child;
        node.memoized_props = memoized_props;
        node.memoized_state = memoized_state;
        node.state_node = state_node;
        wip
    }

    /// A fresh node for `element`, with no history.
    pub fn create_fiber_from_element(&mut self, element: &Element) -> NodeId {
        let tag = match element.kind {
            ElementType::Host(_) => WorkTag::HostElement,
            ElementType::Component(_) => WorkTag::FunctionComponent,
            ElementType::Fragment => WorkTag::Fragment,
        };
        let mut node = WorkNode::new(tag, element.props.clone(), element.key.clone());
        node.element_type = Some(element.kind.clone());
        self.allocate(node)
    }

    /// A fresh text node.
    pub fn create_fiber_from_text(&mut self, content: &str) -> NodeId {
        self.allocate(WorkNode::new(WorkTag::HostText, Props::text(content), None))
    }

    /// A fresh fragment wrapping a nested list of children.
    pub fn create_fiber_from_fragment(&mut self, children: &[Node], key: Option<String>) -> NodeId {
        let props = Props::new().with(CHILDREN, PropValue::Node(Node::List(children.to_vec())));
        let mut node = WorkNode::new(WorkTag::Fragment, props, key);
        node.element_type = Some(ElementType::Fragment);
        self.allocate(node)
    }

    /// Start tracking allocations for a new render attempt.
    pub fn begin_pass(&mut self) {
        self.pass_allocations.clear();
    }

    /// Keep everything allocated by the finished attempt.
    pub fn complete_pass(&mut self) {
        self.pass_allocations.clear();
    }

    /// Release everything allocated by an abandoned attempt.
    pub fn discard_pass(&mut self) -> usize {
        let allocated = std::mem::take(&mut self.pass_allocations);
        let count = allocated.len();
        for id in allocated {
            if let Some(node) = self.nodes.remove(id) {
                if let Some(current) = node.alternate {
                    if let Some(current) = self.nodes.get_mut(current) {
                        current.alternate = None;
                    }
                }
            }
        }
        count
    }

    /// Drop a committed node and its stale alternate for good.
    pub fn release(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(id) {
            if let Some(alternate) = node.alternate {
                self.nodes.remove(alternate);
            }
        }
    }

    /// Children of `id` in sibling order.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            arena: self,
            next: self.get(id).and_then(|node| node.child),
        }
    }
}

impl Index<NodeId> for FiberArena {
    type Output = WorkNode;

    fn index(&self, id: NodeId) -> &WorkNode {
        &self.nodes[id]
    }
}

impl IndexMut<NodeId> for FiberArena {
    fn index_mut(&mut self, id: NodeId) -> &mut WorkNode {
        &mut self.nodes[id]
    }
}

/// Iterator over a sibling chain.
pub struct Children<'a> {
    arena: &'a FiberArena,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|node| node.sibling);
        Some(id)
    }
}
