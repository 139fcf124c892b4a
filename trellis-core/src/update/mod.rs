//! Updates and Priorities
//!
//! State changes enter the system here. A dispatch creates an [`Update`]
//! tagged with a [`Lane`], appends it to the subscriber's [`UpdateQueue`]
//! and marks the lane pending on the root. The render phase later folds the
//! updates for the lane it is processing with [`process_update_queue`].

mod lanes;
mod queue;

pub use lanes::{
    highest_priority_lane, includes_lane, is_higher_priority, merge_lanes, normalize_update_lane,
    request_update_lane, Lane, Lanes, RootLanes, NO_LANE,
};
pub use queue::{
    create_update, create_update_queue, enqueue_update, process_update_queue, Action,
    ConsumptionLog, Processed, SharedQueue, Update, UpdateQueue, UpdateRing,
};
