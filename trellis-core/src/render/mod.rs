//! Render Phase
//!
//! Computes a new work-in-progress tree without touching the attached host
//! tree. Work proceeds one node at a time:
//!
//! 1. **Begin** ([`begin_work`]): top-down. Resolve the node's desired
//!    children (root queue, props, or component output) and reconcile them
//!    against the committed children.
//!
//! 2. **Complete** ([`complete_work`]): bottom-up, once a node has no more
//!    children to begin. Build detached host objects for new host nodes,
//!    flag changed ones, and bubble effect flags to the parent.
//!
//! The walk is driven by [`perform_unit_of_work`], so the caller can stop
//! between any two nodes.

mod begin;
mod child;
mod complete;

pub(crate) use begin::begin_work;
pub(crate) use complete::complete_work;

use crate::error::RenderError;
use crate::fiber::{FiberArena, NodeId};
use crate::host::HostConfig;
use crate::scheduler::ScheduleHandle;
use crate::update::{ConsumptionLog, Lane};

/// Everything a render attempt reads and writes, borrowed from the
/// reconciler for the duration of the attempt.
pub(crate) struct RenderContext<'a> {
    pub arena: &'a mut FiberArena,
    pub host: &'a mut dyn HostConfig,
    pub scheduler: &'a ScheduleHandle,
    pub render_lane: Lane,
    pub consumed: &'a mut ConsumptionLog,
}

/// Process `unit` and return the next node to work on. `None` means the
/// tree rooted at `root` is complete.
pub(crate) fn perform_unit_of_work(
    cx: &mut RenderContext<'_>,
    unit: NodeId,
    root: NodeId,
) -> Result<Option<NodeId>, RenderError> {
    let next = begin_work(cx, unit)?;
    let node = &mut cx.arena[unit];
    node.memoized_props = Some(node.pending_props.clone());

    match next {
        Some(child) => Ok(Some(child)),
        None => Ok(complete_unit_of_work(cx, unit, root)),
    }
}

/// Complete `unit` and its ancestors until one of them has a sibling left
/// to begin.
fn complete_unit_of_work(cx: &mut RenderContext<'_>, unit: NodeId, root: NodeId) -> Option<NodeId> {
    let mut completed = unit;
    loop {
        complete_work(cx, completed);
        if completed == root {
            return None;
        }
        if let Some(sibling) = cx.arena[completed].sibling {
            return Some(sibling);
        }
        completed = cx.arena[completed].parent?;
    }
}
