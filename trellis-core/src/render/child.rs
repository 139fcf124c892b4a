//! Child Reconciliation
//!
//! Diffs a parent's previous children against a new desired child tree and
//! produces the new work-in-progress child list.
//!
//! # Reuse
//!
//! A previous child is reused (through its alternate buffer) when it has the
//! same key and the same type as the desired child. Children of a list
//! without keys are matched by position. Anything not reused is queued on
//! the parent as a deletion.
//!
//! # Effect Tracking
//!
//! The reconciler for a parent that has never been committed does not track
//! effects: its whole subtree is placed in one step by the nearest tracked
//! ancestor. A tracking reconciler marks Placement on children that appear
//! for the first time at their position, and on reused children that moved
//! before a child that stayed put.

use indexmap::IndexMap;

use crate::element::{Element, ElementType, Node, PropValue, Props, CHILDREN};
use crate::fiber::{FiberArena, Flags, NodeId, WorkTag};

/// How a previous child is found again in a keyed diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(String),
    Index(usize),
}

impl ChildKey {
    fn of(key: Option<&String>, index: usize) -> Self {
        key.map_or(Self::Index(index), |k| Self::Key(k.clone()))
    }
}

pub(crate) struct ChildReconciler<'a> {
    arena: &'a mut FiberArena,
    should_track_effects: bool,
}

impl<'a> ChildReconciler<'a> {
    pub(crate) fn new(arena: &'a mut FiberArena, should_track_effects: bool) -> Self {
        Self {
            arena,
            should_track_effects,
        }
    }

    /// Reconcile `desired` under `parent` and return the new first child.
    pub(crate) fn reconcile_child_fibers(
        &mut self,
        parent: NodeId,
        current_first_child: Option<NodeId>,
        desired: &Node,
    ) -> Option<NodeId> {
        // An unkeyed fragment at the top is just its children.
        let unwrapped;
        let desired = match desired {
            Node::Element(element)
                if element.kind == ElementType::Fragment && element.key.is_none() =>
            {
                unwrapped = element.props.children();
                &unwrapped
            }
            other => other,
        };

        match desired {
            Node::Element(element) => {
                let child = self.reconcile_single_element(parent, current_first_child, element);
                Some(self.place_single_child(child))
            }
            Node::Text(text) => {
                let child = self.reconcile_single_text_node(parent, current_first_child, text);
                Some(self.place_single_child(child))
            }
            Node::List(children) => {
                self.reconcile_children_array(parent, current_first_child, children)
            }
            Node::Empty => {
                self.delete_remaining_children(parent, current_first_child);
                None
            }
        }
    }

    fn delete_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.should_track_effects {
            return;
        }
        let node = &mut self.arena[parent];
        node.deletions.push(child);
        node.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, parent: NodeId, first: Option<NodeId>) {
        if !self.should_track_effects {
            return;
        }
        let mut next = first;
        while let Some(child) = next {
            next = self.arena[child].sibling;
            self.delete_child(parent, child);
        }
    }

    /// Reuse `current` for a new render with `props`.
    fn use_fiber(&mut self, current: NodeId, props: Props) -> NodeId {
        let clone = self.arena.create_work_in_progress(current, props);
        let node = &mut self.arena[clone];
        node.index = 0;
        node.sibling = None;
        clone
    }

    fn adopt(&mut self, parent: NodeId, child: NodeId) -> NodeId {
        self.arena[child].parent = Some(parent);
        child
    }

    fn link(&mut self, first: &mut Option<NodeId>, previous: &mut Option<NodeId>, child: NodeId) {
        match *previous {
            None => *first = Some(child),
            Some(prev) => self.arena[prev].sibling = Some(child),
        }
        *previous = Some(child);
    }

    fn place_single_child(&mut self, child: NodeId) -> NodeId {
        let node = &mut self.arena[child];
        if self.should_track_effects && node.alternate.is_none() {
            node.flags |= Flags::PLACEMENT;
        }
        child
    }

    fn place_child(&mut self, child: NodeId, last_placed_index: usize, new_index: usize) -> usize {
        self.arena[child].index = new_index;
        if !self.should_track_effects {
            return last_placed_index;
        }
        match self.arena[child].alternate {
            Some(current) => {
                let old_index = self.arena[current].index;
                if old_index < last_placed_index {
                    // Moved.
                    self.arena[child].flags |= Flags::PLACEMENT;
                    last_placed_index
                } else {
                    old_index
                }
            }
            None => {
                self.arena[child].flags |= Flags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        parent: NodeId,
        current_first_child: Option<NodeId>,
        element: &Element,
    ) -> NodeId {
        let mut next = current_first_child;
        while let Some(child) = next {
            let node = &self.arena[child];
            let sibling = node.sibling;
            if node.key == element.key {
                if node.element_type.as_ref() == Some(&element.kind) {
                    self.delete_remaining_children(parent, sibling);
                    let existing = self.use_fiber(child, element.props.clone());
                    return self.adopt(parent, existing);
                }
                // Same key, different type: nothing after it can match either.
                self.delete_remaining_children(parent, Some(child));
                break;
            }
            self.delete_child(parent, child);
            next = sibling;
        }

        let created = self.arena.create_fiber_from_element(element);
        self.adopt(parent, created)
    }

    fn reconcile_single_text_node(
        &mut self,
        parent: NodeId,
        current_first_child: Option<NodeId>,
        text: &str,
    ) -> NodeId {
        if let Some(child) = current_first_child {
            if self.arena[child].tag == WorkTag::HostText {
                let sibling = self.arena[child].sibling;
                self.delete_remaining_children(parent, sibling);
                let existing = self.use_fiber(child, Props::text(text));
                return self.adopt(parent, existing);
            }
        }
        self.delete_remaining_children(parent, current_first_child);
        let created = self.arena.create_fiber_from_text(text);
        self.adopt(parent, created)
    }

    fn update_text_node(&mut self, parent: NodeId, current: Option<NodeId>, text: &str) -> NodeId {
        let node = match current {
            Some(current) if self.arena[current].tag == WorkTag::HostText => {
                self.use_fiber(current, Props::text(text))
            }
            _ => self.arena.create_fiber_from_text(text),
        };
        self.adopt(parent, node)
    }

    fn update_element(&mut self, parent: NodeId, current: Option<NodeId>, element: &Element) -> NodeId {
        let node = match current {
            Some(current) if self.arena[current].element_type.as_ref() == Some(&element.kind) => {
                self.use_fiber(current, element.props.clone())
            }
            _ => self.arena.create_fiber_from_element(element),
        };
        self.adopt(parent, node)
    }

    fn update_fragment(&mut self, parent: NodeId, current: Option<NodeId>, children: &[Node]) -> NodeId {
        let node = match current {
            Some(current) if self.arena[current].tag == WorkTag::Fragment => {
                let props = Props::new().with(CHILDREN, PropValue::Node(Node::List(children.to_vec())));
                self.use_fiber(current, props)
            }
            _ => self.arena.create_fiber_from_fragment(children, None),
        };
        self.adopt(parent, node)
    }

    fn create_child(&mut self, parent: NodeId, desired: &Node) -> Option<NodeId> {
        let created = match desired {
            Node::Text(text) => self.arena.create_fiber_from_text(text),
            Node::Element(element) => self.arena.create_fiber_from_element(element),
            Node::List(children) => self.arena.create_fiber_from_fragment(children, None),
            Node::Empty => return None,
        };
        Some(self.adopt(parent, created))
    }

    /// Match `desired` against the previous child in the same slot. `None`
    /// means the keys disagree and the fast path must stop.
    fn update_slot(&mut self, parent: NodeId, current: Option<NodeId>, desired: &Node) -> Option<NodeId> {
        let key = current.and_then(|id| self.arena[id].key.clone());
        match desired {
            Node::Text(text) if key.is_none() => Some(self.update_text_node(parent, current, text)),
            Node::Element(element) if element.key == key => {
                Some(self.update_element(parent, current, element))
            }
            Node::List(children) if key.is_none() => {
                Some(self.update_fragment(parent, current, children))
            }
            _ => None,
        }
    }

    fn update_from_map(
        &mut self,
        existing: &IndexMap<ChildKey, NodeId>,
        parent: NodeId,
        new_index: usize,
        desired: &Node,
    ) -> Option<NodeId> {
        let by_index = || existing.get(&ChildKey::Index(new_index)).copied();
        match desired {
            Node::Text(text) => Some(self.update_text_node(parent, by_index(), text)),
            Node::Element(element) => {
                let matched = existing
                    .get(&ChildKey::of(element.key.as_ref(), new_index))
                    .copied();
                Some(self.update_element(parent, matched, element))
            }
            Node::List(children) => Some(self.update_fragment(parent, by_index(), children)),
            Node::Empty => None,
        }
    }

    fn reconcile_children_array(
        &mut self,
        parent: NodeId,
        current_first_child: Option<NodeId>,
        children: &[Node],
    ) -> Option<NodeId> {
        let mut first: Option<NodeId> = None;
        let mut previous: Option<NodeId> = None;

        let mut old = current_first_child;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Walk both lists in lockstep while the slots agree.
        while let Some(old_id) = old {
            if new_index >= children.len() {
                break;
            }
            let (slot, next_old) = if self.arena[old_id].index > new_index {
                (None, Some(old_id))
            } else {
                (Some(old_id), self.arena[old_id].sibling)
            };
            let Some(child) = self.update_slot(parent, slot, &children[new_index]) else {
                if slot.is_none() {
                    old = next_old;
                }
                break;
            };
            if let Some(slot) = slot {
                if self.arena[child].alternate.is_none() {
                    self.delete_child(parent, slot);
                }
            }
            last_placed_index = self.place_child(child, last_placed_index, new_index);
            self.link(&mut first, &mut previous, child);
            old = next_old;
            new_index += 1;
        }

        if new_index == children.len() {
            self.delete_remaining_children(parent, old);
            return first;
        }

        if old.is_none() {
            for (index, desired) in children.iter().enumerate().skip(new_index) {
                let Some(child) = self.create_child(parent, desired) else {
                    continue;
                };
                last_placed_index = self.place_child(child, last_placed_index, index);
                self.link(&mut first, &mut previous, child);
            }
            return first;
        }

        let mut existing = IndexMap::new();
        let mut next = old;
        while let Some(id) = next {
            let node = &self.arena[id];
            existing.insert(ChildKey::of(node.key.as_ref(), node.index), id);
            next = node.sibling;
        }

        for (index, desired) in children.iter().enumerate().skip(new_index) {
            let Some(child) = self.update_from_map(&existing, parent, index, desired) else {
                continue;
            };
            if self.should_track_effects && self.arena[child].alternate.is_some() {
                existing.shift_remove(&ChildKey::of(self.arena[child].key.as_ref(), index));
            }
            last_placed_index = self.place_child(child, last_placed_index, index);
            self.link(&mut first, &mut previous, child);
        }

        for (_, leftover) in existing {
            self.delete_child(parent, leftover);
        }
        first
    }
}
