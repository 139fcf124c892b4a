//! Deferred Work Queue
//!
//! State changes never render inline. They queue a callback here, and the
//! embedder drains the queue once its current synchronous burst is over,
//! the way a browser drains microtasks.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Something that can run a callback after the current burst.
pub trait DeferredExecutor: Send + Sync {
    fn schedule_deferred(&self, task: Task);
}

/// A FIFO of deferred callbacks, drained by [`MicrotaskQueue::flush`].
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued callbacks until the queue is empty, including any that
    /// are queued by the callbacks themselves. Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        loop {
            // The lock is released before the task runs so it can enqueue more.
            let Some(task) = self.tasks.lock().pop_front() else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl DeferredExecutor for MicrotaskQueue {
    fn schedule_deferred(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("queued", &self.len())
            .finish()
    }
}
