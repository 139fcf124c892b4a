//! Begin step: compute a node's desired children and reconcile them.

use super::child::ChildReconciler;
use super::RenderContext;
use crate::element::Node;
use crate::error::RenderError;
use crate::fiber::{MemoizedState, NodeId, WorkTag};
use crate::hooks::render_with_hooks;
use crate::update::{process_update_queue, Processed};

/// Run the begin step for `wip` and return its first child, if any.
pub(crate) fn begin_work(
    cx: &mut RenderContext<'_>,
    wip: NodeId,
) -> Result<Option<NodeId>, RenderError> {
    match cx.arena[wip].tag {
        WorkTag::Root => {
            let desired = update_host_root(cx, wip);
            Ok(reconcile_children(cx, wip, &desired))
        }
        WorkTag::HostElement | WorkTag::Fragment => {
            let desired = cx.arena[wip].pending_props.children();
            Ok(reconcile_children(cx, wip, &desired))
        }
        WorkTag::HostText => Ok(None),
        WorkTag::FunctionComponent => {
            let desired = render_with_hooks(cx, wip)?;
            Ok(reconcile_children(cx, wip, &desired))
        }
    }
}

/// Fold the root's queued renders for this lane into its desired tree.
fn update_host_root(cx: &mut RenderContext<'_>, wip: NodeId) -> Node {
    let node = &cx.arena[wip];
    let base = node.memoized_state.element();
    let Some(queue) = node.update_queue.clone() else {
        return base;
    };

    let taken = queue.lock().take_lane(cx.render_lane);
    let Processed { memoized_state } = process_update_queue(base, Some(&taken), cx.render_lane);
    cx.consumed.record(queue, taken);

    cx.arena[wip].memoized_state = MemoizedState::Element(memoized_state.clone());
    memoized_state
}

fn reconcile_children(cx: &mut RenderContext<'_>, wip: NodeId, desired: &Node) -> Option<NodeId> {
    // A node with a committed counterpart diffs against its children and
    // tracks effects; a fresh one is placed whole by an ancestor.
    let (track, current_first_child) = match cx.arena[wip].alternate {
        Some(current) => (true, cx.arena[current].child),
        None => (false, None),
    };
    let first = ChildReconciler::new(&mut *cx.arena, track).reconcile_child_fibers(
        wip,
        current_first_child,
        desired,
    );
    cx.arena[wip].child = first;
    first
}
