//! Update Queue
//!
//! Pending state changes for one subscriber (the root, or a single hook
//! cell), plus the pure fold that turns them into a new state value.
//!
//! # Ring Semantics
//!
//! Updates form a ring in enqueue order. The queue's handle always refers to
//! the most recently enqueued update ([`UpdateRing::latest`]) and the update
//! after it is the oldest ([`UpdateRing::oldest`]). Enqueueing is O(1) and
//! processing walks the ring exactly once, oldest first.
//!
//! # Consumption
//!
//! A render attempt moves the updates for its lane out of the shared queue
//! and records them in a [`ConsumptionLog`]. If the attempt is abandoned the
//! log puts them back in front of anything enqueued meanwhile, so a discarded
//! work-in-progress tree never loses or reorders state changes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::lanes::Lane;

/// A state change: either a replacement value or a fold over the old state.
pub enum Action<S> {
    Replace(S),
    Reduce(Arc<dyn Fn(&S) -> S + Send + Sync>),
}

impl<S> Action<S> {
    /// Wrap a function of the previous state.
    pub fn reduce<F>(f: F) -> Self
    where
        F: Fn(&S) -> S + Send + Sync + 'static,
    {
        Self::Reduce(Arc::new(f))
    }
}

impl<S: Clone> Action<S> {
    /// Apply this action to `state`.
    pub fn apply(&self, state: S) -> S {
        match self {
            Self::Replace(value) => value.clone(),
            Self::Reduce(f) => f(&state),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(value) => Self::Replace(value.clone()),
            Self::Reduce(f) => Self::Reduce(Arc::clone(f)),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Self::Reduce(_) => f.write_str("Reduce(..)"),
        }
    }
}

/// One queued state change.
#[derive(Debug, Clone)]
pub struct Update<S> {
    pub action: Action<S>,
    pub lane: Lane,
}

/// Build a detached update.
pub fn create_update<S>(action: Action<S>, lane: Lane) -> Update<S> {
    Update { action, lane }
}

/// Updates in enqueue order, addressed as a ring.
#[derive(Debug)]
pub struct UpdateRing<S> {
    updates: VecDeque<Update<S>>,
}

impl<S> Default for UpdateRing<S> {
    fn default() -> Self {
        Self {
            updates: VecDeque::new(),
        }
    }
}

impl<S> UpdateRing<S> {
    /// Append at the tail; the new update becomes `latest`.
    pub fn push(&mut self, update: Update<S>) {
        self.updates.push_back(update);
    }

    /// The most recently enqueued update (the ring's handle).
    pub fn latest(&self) -> Option<&Update<S>> {
        self.updates.back()
    }

    /// The update after `latest` in ring order.
    pub fn oldest(&self) -> Option<&Update<S>> {
        self.updates.front()
    }

    /// Walk the ring once, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Update<S>> {
        self.updates.iter()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Pending updates for one subscriber.
#[derive(Debug)]
pub struct UpdateQueue<S> {
    pending: UpdateRing<S>,
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: UpdateRing::default(),
        }
    }
}

/// A queue shared between its owner and the dispatch closures that feed it.
pub type SharedQueue<S> = Arc<Mutex<UpdateQueue<S>>>;

/// Allocate an empty, shareable queue.
pub fn create_update_queue<S>() -> SharedQueue<S> {
    Arc::new(Mutex::new(UpdateQueue::default()))
}

/// Insert `update` at the tail of the queue's ring.
pub fn enqueue_update<S>(queue: &mut UpdateQueue<S>, update: Update<S>) {
    queue.pending.push(update);
}

impl<S> UpdateQueue<S> {
    /// The pending ring.
    pub fn pending(&self) -> &UpdateRing<S> {
        &self.pending
    }

    /// Move every update on `lane` out of the queue, keeping their order.
    ///
    /// Updates on other lanes stay pending.
    pub fn take_lane(&mut self, lane: Lane) -> UpdateRing<S> {
        let mut taken = UpdateRing::default();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for update in self.pending.updates.drain(..) {
            if update.lane == lane {
                taken.push(update);
            } else {
                kept.push_back(update);
            }
        }
        self.pending.updates = kept;
        taken
    }

    /// Put previously taken updates back in front of the pending ring.
    pub fn restore_front(&mut self, ring: UpdateRing<S>) {
        let mut restored = ring.updates;
        restored.append(&mut self.pending.updates);
        self.pending.updates = restored;
    }
}

/// Result of folding a ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed<S> {
    pub memoized_state: S,
}

/// Fold the updates on `render_lane` over `base_state`, oldest first.
///
/// Updates on any other lane are skipped and left for a pass at their own
/// lane. An absent or empty ring returns `base_state` unchanged.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    pending: Option<&UpdateRing<S>>,
    render_lane: Lane,
) -> Processed<S> {
    let mut state = base_state;
    if let Some(ring) = pending {
        for update in ring.iter() {
            if update.lane == render_lane {
                state = update.action.apply(state);
            } else {
                tracing::trace!(lane = ?update.lane, ?render_lane, "skipping update on another lane");
            }
        }
    }
    Processed {
        memoized_state: state,
    }
}

trait Restore: Send {
    fn restore(self: Box<Self>);
}

struct Consumed<S> {
    queue: SharedQueue<S>,
    updates: UpdateRing<S>,
}

impl<S: Send> Restore for Consumed<S> {
    fn restore(self: Box<Self>) {
        self.queue.lock().restore_front(self.updates);
    }
}

/// Updates taken from shared queues by the in-flight render attempt.
#[derive(Default)]
pub struct ConsumptionLog {
    entries: Vec<Box<dyn Restore>>,
}

impl ConsumptionLog {
    /// Remember that `updates` were taken out of `queue`.
    pub fn record<S: Send + 'static>(&mut self, queue: SharedQueue<S>, updates: UpdateRing<S>) {
        if updates.is_empty() {
            return;
        }
        self.entries.push(Box::new(Consumed { queue, updates }));
    }

    /// The attempt was abandoned: hand every update back to its queue.
    pub fn restore_all(&mut self) {
        for entry in self.entries.drain(..).rev() {
            entry.restore();
        }
    }

    /// The attempt committed: the consumed updates are gone for good.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConsumptionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumptionLog")
            .field("entries", &self.entries.len())
            .finish()
    }
}
