//! Commit Phase
//!
//! Applies a finished work-in-progress tree to the host. One iterative,
//! depth-first walk visits every node whose subtree carries effect flags,
//! children before parents. Each node applies its own effects in a fixed
//! order (Placement, then Update, then Child-Deletion) and clears each bit
//! once applied, so committing the same tree twice changes nothing.
//!
//! Nothing here returns an error. An effect that cannot be applied (say, a
//! placement with no host parent) is logged and skipped: the host tree is
//! already half-updated at that point and there is no way back.

use crate::fiber::{FiberArena, Flags, MemoizedState, NodeId, WorkTag, MUTATION_MASK};
use crate::host::{HostConfig, InstanceId};

/// Commit every effect in the tree rooted at `finished` into `container`.
///
/// Returns the work nodes of deleted subtrees, which the caller releases
/// once the buffers are swapped.
pub(crate) fn commit_mutation_effects(
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    finished: NodeId,
    container: InstanceId,
) -> Vec<NodeId> {
    let mut released = Vec::new();
    let mut next = Some(finished);

    while let Some(id) = next {
        let node = &arena[id];
        if node.subtree_flags.intersects(MUTATION_MASK) {
            if let Some(child) = node.child {
                next = Some(child);
                continue;
            }
        }

        let mut cursor = id;
        next = loop {
            commit_mutation_effects_on_node(arena, host, cursor, container, &mut released);
            if cursor == finished {
                break None;
            }
            if let Some(sibling) = arena[cursor].sibling {
                break Some(sibling);
            }
            match arena[cursor].parent {
                Some(parent) => cursor = parent,
                None => break None,
            }
        };
    }

    released
}

fn commit_mutation_effects_on_node(
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    id: NodeId,
    container: InstanceId,
    released: &mut Vec<NodeId>,
) {
    let flags = arena[id].flags;

    if flags.contains(Flags::PLACEMENT) {
        commit_placement(arena, host, id, container);
        arena[id].flags.remove(Flags::PLACEMENT);
    }

    if flags.contains(Flags::UPDATE) {
        commit_update(arena, host, id);
        arena[id].flags.remove(Flags::UPDATE);
    }

    if flags.contains(Flags::CHILD_DELETION) {
        let deletions = std::mem::take(&mut arena[id].deletions);
        for deleted in deletions {
            commit_deletion(arena, host, id, deleted, container, released);
        }
        arena[id].flags.remove(Flags::CHILD_DELETION);
    }

    arena[id].subtree_flags = Flags::empty();
}

fn is_host_parent(tag: WorkTag) -> bool {
    matches!(tag, WorkTag::HostElement | WorkTag::Root)
}

/// The host object that children of `start` attach to: `start` itself if it
/// is a host element, otherwise its nearest host ancestor.
fn host_parent(arena: &FiberArena, start: Option<NodeId>, container: InstanceId) -> Option<InstanceId> {
    let mut next = start;
    while let Some(id) = next {
        let node = &arena[id];
        match node.tag {
            WorkTag::HostElement => return node.state_node.instance(),
            WorkTag::Root => return Some(container),
            _ => next = node.parent,
        }
    }
    None
}

/// The first host object after `id` in document order, under the same host
/// parent, that is already attached.
fn get_host_sibling(arena: &FiberArena, id: NodeId) -> Option<InstanceId> {
    let mut node = id;
    'siblings: loop {
        while arena[node].sibling.is_none() {
            match arena[node].parent {
                Some(parent) if !is_host_parent(arena[parent].tag) => node = parent,
                _ => return None,
            }
        }
        node = arena[node].sibling?;

        while !arena[node].tag.is_host() {
            // A pending wrapper will move, so nothing inside it is a stable anchor.
            if arena[node].flags.contains(Flags::PLACEMENT) {
                continue 'siblings;
            }
            match arena[node].child {
                Some(child) => node = child,
                None => continue 'siblings,
            }
        }

        if !arena[node].flags.contains(Flags::PLACEMENT) {
            return arena[node].state_node.instance();
        }
    }
}

fn commit_placement(arena: &FiberArena, host: &mut dyn HostConfig, id: NodeId, container: InstanceId) {
    let Some(parent) = host_parent(arena, arena[id].parent, container) else {
        tracing::warn!(node = ?id, "placement without a host parent, skipping");
        return;
    };
    let before = get_host_sibling(arena, id);
    insert_or_append_placement_node(arena, host, id, before, parent);
}

fn insert_or_append_placement_node(
    arena: &FiberArena,
    host: &mut dyn HostConfig,
    id: NodeId,
    before: Option<InstanceId>,
    parent: InstanceId,
) {
    let node = &arena[id];
    if node.tag.is_host() {
        let Some(instance) = node.state_node.instance() else {
            tracing::warn!(node = ?id, "host node without a host object, skipping placement");
            return;
        };
        tracing::trace!(node = ?id, ?instance, ?before, "placing");
        match before {
            Some(before) => host.insert_before(parent, instance, before),
            None => host.append_child(parent, instance),
        }
        return;
    }

    let mut child = node.child;
    while let Some(id) = child {
        insert_or_append_placement_node(arena, host, id, before, parent);
        child = arena[id].sibling;
    }
}

fn commit_update(arena: &FiberArena, host: &mut dyn HostConfig, id: NodeId) {
    let node = &arena[id];
    let (Some(instance), Some(props)) = (node.state_node.instance(), node.memoized_props.as_ref()) else {
        return;
    };
    tracing::trace!(node = ?id, ?instance, "updating");
    match node.tag {
        WorkTag::HostText => host.commit_text_update(instance, props.content().unwrap_or_default()),
        WorkTag::HostElement => host.attach_props(instance, props),
        _ => {}
    }
}

/// Detach the subtree of `deleted`, a child that `parent` no longer renders.
fn commit_deletion(
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    parent: NodeId,
    deleted: NodeId,
    container: InstanceId,
    released: &mut Vec<NodeId>,
) {
    let host_parent = host_parent(arena, Some(parent), container);

    // Only the outermost host objects are removed; their descendants go
    // with them.
    let mut removals = Vec::new();
    let mut stack = vec![(deleted, false)];
    while let Some((id, inside_host)) = stack.pop() {
        released.push(id);
        let node = &mut arena[id];
        if node.tag == WorkTag::FunctionComponent {
            node.memoized_state = MemoizedState::None;
        }
        let is_host = node.tag.is_host();
        if is_host && !inside_host {
            removals.extend(node.state_node.instance());
        }

        let children: Vec<NodeId> = arena.children(id).collect();
        stack.extend(children.into_iter().rev().map(|c| (c, inside_host || is_host)));
    }

    match host_parent {
        Some(host_parent) => {
            for instance in removals {
                tracing::trace!(node = ?deleted, ?instance, "removing");
                host.remove_child(host_parent, instance);
            }
        }
        None if !removals.is_empty() => {
            tracing::warn!(node = ?deleted, "deletion without a host parent, skipping");
        }
        None => {}
    }

    for id in [Some(deleted), arena[deleted].alternate].into_iter().flatten() {
        let node = &mut arena[id];
        node.parent = None;
        node.child = None;
    }
}
