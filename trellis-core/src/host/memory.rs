//! In-Memory Host
//!
//! A host adapter backed by a plain element tree. It records every mutation
//! it receives, so callers can assert on both the resulting tree and the
//! exact operations that produced it.
//!
//! The host is a cheap handle: clones share the same tree. Hand one clone to
//! the root and keep another to inspect.
//!
//! Removing a child drops it and its whole subtree. Objects that were created
//! but never attached, such as those built by an abandoned render, stay until
//! [`MemoryHost::prune_detached`] is called.

use std::fmt::Write as _;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{HostConfig, InstanceId};
use crate::element::Props;

/// One mutation received from the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateElement { id: InstanceId, type_name: String },
    CreateText { id: InstanceId, content: String },
    AppendChild { parent: InstanceId, child: InstanceId },
    InsertBefore { parent: InstanceId, child: InstanceId, before: InstanceId },
    RemoveChild { parent: InstanceId, child: InstanceId },
    SetText { id: InstanceId, content: String },
    AttachProps { id: InstanceId },
}

impl HostOp {
    /// Whether this operation changes the attached tree.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::CreateElement { .. } | Self::CreateText { .. })
    }
}

/// A serializable picture of a host subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostSnapshot {
    Container { children: Vec<HostSnapshot> },
    Element { type_name: String, children: Vec<HostSnapshot> },
    Text { content: String },
}

#[derive(Debug)]
enum HostKind {
    Container,
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct HostObject {
    kind: HostKind,
    parent: Option<InstanceId>,
    children: Vec<InstanceId>,
    props: Option<Props>,
}

impl HostObject {
    fn new(kind: HostKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            props: None,
        }
    }
}

#[derive(Debug, Default)]
struct HostTree {
    objects: IndexMap<InstanceId, HostObject>,
    ops: Vec<HostOp>,
}

impl HostTree {
    fn insert(&mut self, kind: HostKind) -> InstanceId {
        let id = InstanceId::new();
        self.objects.insert(id, HostObject::new(kind));
        id
    }

    fn detach(&mut self, child: InstanceId) {
        let Some(parent) = self.objects.get_mut(&child).and_then(|c| c.parent.take()) else {
            return;
        };
        if let Some(parent) = self.objects.get_mut(&parent) {
            parent.children.retain(|c| *c != child);
        }
    }

    /// Forget `root` and everything below it.
    fn drop_subtree(&mut self, root: InstanceId) -> usize {
        let mut dropped = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(object) = self.objects.swap_remove(&id) {
                stack.extend(object.children);
                dropped += 1;
            }
        }
        dropped
    }

    fn attach(&mut self, parent: InstanceId, child: InstanceId, before: Option<InstanceId>) -> bool {
        if !self.objects.contains_key(&parent) || !self.objects.contains_key(&child) {
            tracing::warn!(?parent, ?child, "host operation on unknown instance");
            return false;
        }
        self.detach(child);
        let Some(parent_object) = self.objects.get_mut(&parent) else {
            return false;
        };
        let position = before.and_then(|b| parent_object.children.iter().position(|c| *c == b));
        if before.is_some() && position.is_none() {
            tracing::warn!(?parent, ?before, "insertion anchor is not a child, appending");
        }
        match position {
            Some(index) => parent_object.children.insert(index, child),
            None => parent_object.children.push(child),
        }
        if let Some(child_object) = self.objects.get_mut(&child) {
            child_object.parent = Some(parent);
        }
        true
    }

    fn snapshot(&self, id: InstanceId) -> Option<HostSnapshot> {
        let object = self.objects.get(&id)?;
        let children = || {
            object
                .children
                .iter()
                .filter_map(|c| self.snapshot(*c))
                .collect()
        };
        Some(match &object.kind {
            HostKind::Container => HostSnapshot::Container {
                children: children(),
            },
            HostKind::Element(type_name) => HostSnapshot::Element {
                type_name: type_name.clone(),
                children: children(),
            },
            HostKind::Text(content) => HostSnapshot::Text {
                content: content.clone(),
            },
        })
    }
}

/// An in-memory host environment.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    tree: Arc<Mutex<HostTree>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container to mount a root into.
    pub fn create_container(&self) -> InstanceId {
        self.tree.lock().insert(HostKind::Container)
    }

    /// Children of `id`, in order.
    pub fn children_of(&self, id: InstanceId) -> Vec<InstanceId> {
        self.tree
            .lock()
            .objects
            .get(&id)
            .map(|o| o.children.clone())
            .unwrap_or_default()
    }

    /// The object `id` is attached to, if any.
    pub fn parent_of(&self, id: InstanceId) -> Option<InstanceId> {
        self.tree.lock().objects.get(&id).and_then(|o| o.parent)
    }

    /// Content of a text node.
    pub fn text_of(&self, id: InstanceId) -> Option<String> {
        match &self.tree.lock().objects.get(&id)?.kind {
            HostKind::Text(content) => Some(content.clone()),
            _ => None,
        }
    }

    /// The last property bag committed for `id`.
    pub fn props_of(&self, id: InstanceId) -> Option<Props> {
        self.tree.lock().objects.get(&id).and_then(|o| o.props.clone())
    }

    /// Snapshot of the subtree rooted at `id`.
    pub fn snapshot(&self, id: InstanceId) -> Option<HostSnapshot> {
        self.tree.lock().snapshot(id)
    }

    /// Compact markup of everything under `id`, e.g. `<div><span>x</span></div>`.
    pub fn markup(&self, id: InstanceId) -> String {
        fn write_node(out: &mut String, node: &HostSnapshot) {
            match node {
                HostSnapshot::Container { children } => {
                    children.iter().for_each(|c| write_node(out, c));
                }
                HostSnapshot::Element {
                    type_name,
                    children,
                } => {
                    let _ = write!(out, "<{type_name}>");
                    children.iter().for_each(|c| write_node(out, c));
                    let _ = write!(out, "</{type_name}>");
                }
                HostSnapshot::Text { content } => out.push_str(content),
            }
        }

        let mut out = String::new();
        if let Some(snapshot) = self.snapshot(id) {
            write_node(&mut out, &snapshot);
        }
        out
    }

    /// Every operation received so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.tree.lock().ops.clone()
    }

    /// Operations that changed the attached tree.
    pub fn mutations(&self) -> Vec<HostOp> {
        self.tree
            .lock()
            .ops
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget the recorded operations.
    pub fn clear_ops(&self) {
        self.tree.lock().ops.clear();
    }

    /// Number of live host objects, attached or not.
    pub fn object_count(&self) -> usize {
        self.tree.lock().objects.len()
    }

    /// Drop every object not reachable from a container. Returns how many
    /// were dropped.
    ///
    /// Only call this between renders: a render in progress may hold
    /// instances it has created but not yet attached.
    pub fn prune_detached(&self) -> usize {
        let mut tree = self.tree.lock();
        let mut reachable = IndexSet::new();
        let mut stack: Vec<InstanceId> = tree
            .objects
            .iter()
            .filter(|(_, o)| matches!(o.kind, HostKind::Container))
            .map(|(id, _)| *id)
            .collect();
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                if let Some(object) = tree.objects.get(&id) {
                    stack.extend(object.children.iter().copied());
                }
            }
        }

        let before = tree.objects.len();
        tree.objects.retain(|id, _| reachable.contains(id));
        let dropped = before - tree.objects.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned detached host objects");
        }
        dropped
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&mut self, type_name: &str) -> InstanceId {
        let mut tree = self.tree.lock();
        let id = tree.insert(HostKind::Element(type_name.to_owned()));
        tree.ops.push(HostOp::CreateElement {
            id,
            type_name: type_name.to_owned(),
        });
        id
    }

    fn create_text_instance(&mut self, content: &str) -> InstanceId {
        let mut tree = self.tree.lock();
        let id = tree.insert(HostKind::Text(content.to_owned()));
        tree.ops.push(HostOp::CreateText {
            id,
            content: content.to_owned(),
        });
        id
    }

    fn append_child(&mut self, parent: InstanceId, child: InstanceId) {
        let mut tree = self.tree.lock();
        if tree.attach(parent, child, None) {
            tree.ops.push(HostOp::AppendChild { parent, child });
        }
    }

    fn insert_before(&mut self, parent: InstanceId, child: InstanceId, before: InstanceId) {
        let mut tree = self.tree.lock();
        if tree.attach(parent, child, Some(before)) {
            tree.ops.push(HostOp::InsertBefore {
                parent,
                child,
                before,
            });
        }
    }

    fn remove_child(&mut self, parent: InstanceId, child: InstanceId) {
        let mut tree = self.tree.lock();
        let attached = tree.objects.get(&child).and_then(|c| c.parent) == Some(parent);
        if !attached {
            tracing::warn!(?parent, ?child, "removing an instance that is not a child");
            return;
        }
        tree.detach(child);
        let dropped = tree.drop_subtree(child);
        tracing::trace!(?child, dropped, "host subtree removed");
        tree.ops.push(HostOp::RemoveChild { parent, child });
    }

    fn commit_text_update(&mut self, instance: InstanceId, content: &str) {
        let mut guard = self.tree.lock();
        let tree = &mut *guard;
        match tree.objects.get_mut(&instance).map(|o| &mut o.kind) {
            Some(HostKind::Text(text)) => {
                *text = content.to_owned();
                tree.ops.push(HostOp::SetText {
                    id: instance,
                    content: content.to_owned(),
                });
            }
            _ => tracing::warn!(?instance, "text update on a non-text instance"),
        }
    }

    fn attach_props(&mut self, instance: InstanceId, props: &Props) {
        let mut guard = self.tree.lock();
        let tree = &mut *guard;
        if let Some(object) = tree.objects.get_mut(&instance) {
            object.props = Some(props.clone());
            tree.ops.push(HostOp::AttachProps { id: instance });
        }
    }
}
