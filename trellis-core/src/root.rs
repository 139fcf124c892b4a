//! Root Lifecycle
//!
//! The embedding application's entry point. [`create_root`] mounts a
//! reconciler onto a host container and returns a [`RootHandle`]. Rendering
//! through the handle only queues work; it runs when the deferred queue is
//! flushed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ReconcilerConfig;
use crate::element::Node;
use crate::host::{HostConfig, InstanceId};
use crate::reconciler::{Reconciler, RenderStats};
use crate::scheduler::{MicrotaskQueue, ScheduleHandle};
use crate::update::{
    create_update, enqueue_update, normalize_update_lane, request_update_lane, Action, Lane,
    SharedQueue,
};

/// Mount a root with default configuration and its own deferred queue.
pub fn create_root<H>(container: InstanceId, host: H) -> RootHandle
where
    H: HostConfig + 'static,
{
    create_root_with_config(container, host, ReconcilerConfig::default(), MicrotaskQueue::new())
}

/// Mount a root with explicit configuration, scheduling onto `microtasks`.
///
/// Several roots may share one queue.
pub fn create_root_with_config<H>(
    container: InstanceId,
    host: H,
    config: ReconcilerConfig,
    microtasks: MicrotaskQueue,
) -> RootHandle
where
    H: HostConfig + 'static,
{
    let executor = Arc::new(microtasks.clone());
    let reconciler = Arc::new_cyclic(|weak| {
        let scheduler = ScheduleHandle::new(executor, weak.clone());
        Mutex::new(Reconciler::new(container, Box::new(host), config, scheduler))
    });

    let (scheduler, root_queue) = {
        let guard = reconciler.lock();
        (guard.scheduler().clone(), Arc::clone(guard.root_queue()))
    };
    tracing::debug!(?container, "root created");

    RootHandle {
        reconciler,
        scheduler,
        root_queue,
        microtasks,
        container,
    }
}

/// Handle to a mounted root. Clones refer to the same root.
#[derive(Clone)]
pub struct RootHandle {
    reconciler: Arc<Mutex<Reconciler>>,
    scheduler: ScheduleHandle,
    root_queue: SharedQueue<Node>,
    microtasks: MicrotaskQueue,
    container: InstanceId,
}

impl RootHandle {
    /// Queue `node` as the root's new desired tree.
    pub fn render(&self, node: impl Into<Node>) {
        self.render_with_lane(node, request_update_lane());
    }

    /// Queue `node` on an explicit lane. An empty or multi-bit `lane` is
    /// narrowed to a single lane first.
    pub fn render_with_lane(&self, node: impl Into<Node>, lane: Lane) {
        let lane = normalize_update_lane(lane);
        enqueue_update(
            &mut self.root_queue.lock(),
            create_update(Action::Replace(node.into()), lane),
        );
        self.scheduler.schedule_update(lane);
    }

    /// Queue removal of everything under the container.
    pub fn unmount(&self) {
        self.render(Node::Empty);
    }

    /// Run all deferred work, including renders it schedules. Returns the
    /// number of callbacks run.
    pub fn flush_sync(&self) -> usize {
        self.microtasks.flush()
    }

    /// Counters for this root.
    ///
    /// Locks the reconciler, so it must not be called from inside a
    /// component render. Use [`try_inspect`](Self::try_inspect) there.
    pub fn stats(&self) -> RenderStats {
        self.reconciler.lock().stats()
    }

    /// The desired tree last committed at the root.
    ///
    /// Locks the reconciler, so it must not be called from inside a
    /// component render.
    pub fn rendered(&self) -> Node {
        let reconciler = self.reconciler.lock();
        reconciler
            .node(reconciler.current_root())
            .map(|root| root.memoized_state.element())
            .unwrap_or_default()
    }

    /// Read access to the reconciler, for diagnostics.
    ///
    /// Blocks while a render holds the reconciler, which deadlocks when
    /// called from a component of this root. Do not flush deferred work
    /// from inside `f`.
    pub fn inspect<R>(&self, f: impl FnOnce(&Reconciler) -> R) -> R {
        f(&self.reconciler.lock())
    }

    /// Like [`inspect`](Self::inspect), but returns `None` instead of
    /// blocking when the reconciler is busy rendering.
    pub fn try_inspect<R>(&self, f: impl FnOnce(&Reconciler) -> R) -> Option<R> {
        match self.reconciler.try_lock() {
            Some(reconciler) => Some(f(&reconciler)),
            None => {
                tracing::warn!(container = ?self.container, "reconciler busy, skipping inspection");
                None
            }
        }
    }

    pub fn container(&self) -> InstanceId {
        self.container
    }

    /// The deferred queue this root schedules onto.
    pub fn microtasks(&self) -> &MicrotaskQueue {
        &self.microtasks
    }
}

impl fmt::Debug for RootHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootHandle")
            .field("container", &self.container)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
