//! Complete step: build detached host objects and bubble effect flags.

use super::RenderContext;
use crate::fiber::{FiberArena, Flags, NodeId, StateNode, WorkTag};
use crate::host::{HostConfig, InstanceId};

/// Finish `wip` once all of its children are complete.
pub(crate) fn complete_work(cx: &mut RenderContext<'_>, wip: NodeId) {
    let node = &cx.arena[wip];
    let committed = node
        .alternate
        .filter(|_| node.state_node.instance().is_some());

    let tag = node.tag;

    match tag {
        WorkTag::HostElement => match committed {
            Some(current) => {
                let unchanged = cx.arena[current]
                    .memoized_props
                    .as_ref()
                    .is_some_and(|old| old.same_attributes(&cx.arena[wip].pending_props));
                if !unchanged {
                    cx.arena[wip].flags |= Flags::UPDATE;
                }
            }
            None => {
                let Some(type_name) = node.type_name().map(str::to_owned) else {
                    tracing::warn!(node = ?wip, "host element without a type name");
                    bubble_properties(&mut *cx.arena, wip);
                    return;
                };
                let props = node.pending_props.clone();
                let instance = cx.host.create_instance(&type_name);
                append_all_children(&*cx.arena, &mut *cx.host, instance, wip);
                cx.host.attach_props(instance, &props);
                cx.arena[wip].state_node = StateNode::Host(instance);
            }
        },
        WorkTag::HostText => {
            let content = node.pending_props.content().unwrap_or_default().to_owned();
            match committed {
                Some(current) => {
                    let old = cx.arena[current]
                        .memoized_props
                        .as_ref()
                        .and_then(|props| props.content());
                    if old != Some(content.as_str()) {
                        cx.arena[wip].flags |= Flags::UPDATE;
                    }
                }
                None => {
                    let instance = cx.host.create_text_instance(&content);
                    cx.arena[wip].state_node = StateNode::Host(instance);
                }
            }
        }
        WorkTag::Root | WorkTag::FunctionComponent | WorkTag::Fragment => {}
    }

    bubble_properties(&mut *cx.arena, wip);
}

/// Append the top-level host objects below `wip` to `parent`, looking
/// through wrapper nodes.
fn append_all_children(
    arena: &FiberArena,
    host: &mut dyn HostConfig,
    parent: InstanceId,
    wip: NodeId,
) {
    let mut next = arena[wip].child;
    'outer: while let Some(id) = next {
        let node = &arena[id];
        if node.tag.is_host() {
            if let Some(instance) = node.state_node.instance() {
                host.append_child(parent, instance);
            }
        } else if let Some(child) = node.child {
            next = Some(child);
            continue;
        }

        let mut cursor = id;
        loop {
            if let Some(sibling) = arena[cursor].sibling {
                next = Some(sibling);
                continue 'outer;
            }
            match arena[cursor].parent {
                Some(parent) if parent != wip => cursor = parent,
                _ => break 'outer,
            }
        }
    }
}

/// Merge every child's flags into `wip.subtree_flags`, together with its own.
pub(crate) fn bubble_properties(arena: &mut FiberArena, wip: NodeId) {
    let mut subtree = arena[wip].flags;
    let mut next = arena[wip].child;
    while let Some(child) = next {
        let node = &mut arena[child];
        subtree |= node.flags | node.subtree_flags;
        node.parent = Some(wip);
        next = node.sibling;
    }
    arena[wip].subtree_flags |= subtree;
}
