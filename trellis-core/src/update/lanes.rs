//! Priority Lanes
//!
//! A lane is a single bit; a set of lanes is a bitset. The lower the bit,
//! the higher the priority, so "highest priority pending" is simply the
//! lowest set bit of the root's pending set.

use bitflags::bitflags;

bitflags! {
    /// A set of priority classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        /// Discrete user input and explicit renders. Highest priority.
        const SYNC = 1 << 0;
        /// Continuous input such as drags and scrolls.
        const INPUT_CONTINUOUS = 1 << 1;
        /// Ordinary updates.
        const DEFAULT = 1 << 2;
        /// Work that can wait indefinitely.
        const IDLE = 1 << 3;
    }
}

/// A single lane. Same representation as [`Lanes`] with at most one bit set.
pub type Lane = Lanes;

/// The empty lane.
pub const NO_LANE: Lane = Lanes::empty();

/// Union of two lane sets.
pub fn merge_lanes(a: Lanes, b: Lanes) -> Lanes {
    a | b
}

/// Whether `set` contains every bit of `subset`.
pub fn includes_lane(set: Lanes, subset: Lane) -> bool {
    !subset.is_empty() && set.contains(subset)
}

/// Lane to tag a freshly requested update with.
pub fn request_update_lane() -> Lane {
    Lanes::SYNC
}

/// Narrow a caller-supplied lane to exactly one bit.
///
/// Updates are matched against the render lane bit for bit, so an update
/// tagged with no lane or with several would never be processed. An empty
/// lane falls back to [`request_update_lane`]; a multi-bit set keeps its
/// highest-priority bit.
pub fn normalize_update_lane(lane: Lane) -> Lane {
    if lane.is_empty() {
        tracing::warn!("update dispatched without a lane, using the default lane");
        return request_update_lane();
    }
    let single = highest_priority_lane(lane);
    if single != lane {
        tracing::warn!(?lane, narrowed = ?single, "update dispatched on several lanes, keeping the highest");
    }
    single
}

/// Isolate the highest-priority (lowest) bit of `lanes`.
pub fn highest_priority_lane(lanes: Lanes) -> Lane {
    let bits = lanes.bits();
    Lanes::from_bits_retain(bits & bits.wrapping_neg())
}

/// Whether `a` strictly outranks `b`. An empty lane outranks nothing.
pub fn is_higher_priority(a: Lane, b: Lane) -> bool {
    !a.is_empty() && (b.is_empty() || a.bits() < b.bits())
}

/// Lane bookkeeping for one root.
///
/// Shared between the reconciler and every dispatch closure bound to the
/// root, so it lives behind a lock rather than on the root descriptor.
#[derive(Debug, Default)]
pub struct RootLanes {
    /// Lanes with at least one queued update.
    pub pending: Lanes,
    /// Priority of the deferred callback already queued, if any.
    pub callback_priority: Option<Lane>,
    /// Lanes that received updates since the current render began.
    updated_since_render: Lanes,
}

impl RootLanes {
    /// Record an update on `lane`.
    pub fn mark_root_updated(&mut self, lane: Lane) {
        self.pending = merge_lanes(self.pending, lane);
        self.updated_since_render = merge_lanes(self.updated_since_render, lane);
    }

    /// Start tracking updates that arrive while `lane` renders.
    pub fn begin_render(&mut self) {
        self.updated_since_render = Lanes::empty();
    }

    /// Retire `lane` after its commit.
    ///
    /// Updates that landed on the same lane mid-render were not part of the
    /// committed pass, so the lane stays pending for them.
    pub fn mark_root_finished(&mut self, lane: Lane) {
        self.pending.remove(lane.difference(self.updated_since_render));
    }

    /// The lane the next render should process.
    pub fn next_lane(&self) -> Lane {
        highest_priority_lane(self.pending)
    }
}
