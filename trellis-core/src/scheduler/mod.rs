//! Scheduling
//!
//! Connects state changes to render passes.
//!
//! # How It Works
//!
//! 1. A dispatch marks its lane pending on the root's [`RootLanes`].
//!
//! 2. [`ScheduleHandle::ensure_root_is_scheduled`] queues one deferred
//!    callback for the highest pending lane. Asking again while a callback
//!    of equal or higher priority is already queued does nothing, which is
//!    what coalesces a burst of dispatches into one render.
//!
//! 3. The callback locks the reconciler and runs a render/commit cycle for
//!    whichever lane is highest when it actually runs.
//!
//! 4. If lanes are still pending after the commit, the root is scheduled
//!    again, one lane per callback.

mod microtask;

pub use microtask::{DeferredExecutor, MicrotaskQueue, Task};

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::reconciler::Reconciler;
use crate::update::{is_higher_priority, Lane, Lanes, RootLanes};

/// Everything a dispatch needs to get its root rendered.
///
/// Holds the reconciler weakly: a dispatch closure that outlives its root
/// schedules nothing.
#[derive(Clone)]
pub struct ScheduleHandle {
    lanes: Arc<Mutex<RootLanes>>,
    executor: Arc<dyn DeferredExecutor>,
    reconciler: Weak<Mutex<Reconciler>>,
}

impl ScheduleHandle {
    pub(crate) fn new(
        executor: Arc<dyn DeferredExecutor>,
        reconciler: Weak<Mutex<Reconciler>>,
    ) -> Self {
        Self {
            lanes: Arc::new(Mutex::new(RootLanes::default())),
            executor,
            reconciler,
        }
    }

    /// Mark `lane` pending and make sure a render is on its way.
    pub fn schedule_update(&self, lane: Lane) {
        self.lanes.lock().mark_root_updated(lane);
        self.ensure_root_is_scheduled();
    }

    /// Queue a deferred render for the highest pending lane, unless one of
    /// equal or higher priority is already queued.
    pub fn ensure_root_is_scheduled(&self) {
        let lane = {
            let mut lanes = self.lanes.lock();
            let next = lanes.next_lane();
            if next.is_empty() {
                return;
            }
            if let Some(existing) = lanes.callback_priority {
                if !is_higher_priority(next, existing) {
                    return;
                }
            }
            lanes.callback_priority = Some(next);
            next
        };

        tracing::trace!(?lane, "scheduling deferred render");
        let reconciler = self.reconciler.clone();
        self.executor.schedule_deferred(Box::new(move || {
            if let Some(reconciler) = reconciler.upgrade() {
                reconciler.lock().perform_sync_work_on_root();
            }
        }));
    }

    /// Lanes with queued updates.
    pub fn pending_lanes(&self) -> Lanes {
        self.lanes.lock().pending
    }

    pub(crate) fn lanes(&self) -> &Arc<Mutex<RootLanes>> {
        &self.lanes
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("lanes", &*self.lanes.lock())
            .finish()
    }
}
