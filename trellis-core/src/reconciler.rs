//! Reconciler Session
//!
//! One [`Reconciler`] owns everything about a mounted root: the node arena
//! with both buffers, the host adapter and the root descriptor. Deferred
//! callbacks lock it and call [`Reconciler::perform_sync_work_on_root`],
//! which renders and commits exactly one lane.
//!
//! # Attempts
//!
//! A render attempt starts from a fresh work-in-progress root and walks the
//! tree one unit at a time. It ends in one of three ways:
//!
//! - **Completed**: the finished tree is committed and becomes current.
//! - **Interrupted**: a higher-priority lane became pending between two
//!   units. The attempt is thrown away and the root rescheduled.
//! - **Failed**: a component or hook returned an error. The attempt is
//!   thrown away and retried from scratch, as often as the
//!   [`ReconcilerConfig`] allows.
//!
//! Throwing an attempt away releases the nodes it allocated and puts every
//! update it consumed back on its queue. Nothing from it reaches the host.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::commit::commit_mutation_effects;
use crate::config::ReconcilerConfig;
use crate::element::{Node, Props};
use crate::error::RenderError;
use crate::fiber::{FiberArena, NodeId, WorkNode, MUTATION_MASK};
use crate::host::{HostConfig, InstanceId};
use crate::render::{perform_unit_of_work, RenderContext};
use crate::scheduler::ScheduleHandle;
use crate::update::{
    create_update_queue, is_higher_priority, ConsumptionLog, Lane, SharedQueue, NO_LANE,
};

/// Counters describing the work a root has done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Render attempts started, retries included.
    pub renders_started: u64,
    pub commits: u64,
    /// Attempts that failed and were retried.
    pub retries: u64,
    /// Attempts abandoned for a higher-priority lane.
    pub interrupted: u64,
    /// Lanes given up on after the retry limit.
    pub failed: u64,
    /// Work nodes currently allocated, across both buffers.
    pub live_work_nodes: usize,
}

/// Per-root bookkeeping.
#[derive(Debug)]
struct RootDescriptor {
    container: InstanceId,
    current: NodeId,
    finished_work: Option<NodeId>,
    finished_lane: Lane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderOutcome {
    Completed,
    Interrupted,
}

/// The render/commit engine for one root.
pub struct Reconciler {
    arena: FiberArena,
    root: RootDescriptor,
    root_queue: SharedQueue<Node>,
    host: Box<dyn HostConfig>,
    config: ReconcilerConfig,
    scheduler: ScheduleHandle,
    consumed: ConsumptionLog,
    stats: RenderStats,
    last_error: Option<RenderError>,
}

impl Reconciler {
    pub(crate) fn new(
        container: InstanceId,
        host: Box<dyn HostConfig>,
        config: ReconcilerConfig,
        scheduler: ScheduleHandle,
    ) -> Self {
        let root_queue = create_update_queue();
        let mut arena = FiberArena::new();
        let current = arena.create_host_root(Arc::clone(&root_queue));
        Self {
            arena,
            root: RootDescriptor {
                container,
                current,
                finished_work: None,
                finished_lane: NO_LANE,
            },
            root_queue,
            host,
            config,
            scheduler,
            consumed: ConsumptionLog::default(),
            stats: RenderStats::default(),
            last_error: None,
        }
    }

    /// Render and commit the highest-priority pending lane, if any.
    pub fn perform_sync_work_on_root(&mut self) {
        let lane = {
            let mut lanes = self.scheduler.lanes().lock();
            lanes.callback_priority = None;
            let lane = lanes.next_lane();
            if !lane.is_empty() {
                lanes.begin_render();
            }
            lane
        };
        if lane.is_empty() {
            return;
        }

        tracing::debug!(?lane, "rendering root");
        match self.render_root_with_retries(lane) {
            Ok(RenderOutcome::Completed) => {
                self.commit_root();
                self.scheduler.ensure_root_is_scheduled();
            }
            Ok(RenderOutcome::Interrupted) => {
                self.stats.interrupted += 1;
                self.scheduler.ensure_root_is_scheduled();
            }
            Err(err) => {
                // The lane stays pending; the next scheduled render tries again.
                tracing::error!(%err, ?lane, "render abandoned");
                self.stats.failed += 1;
                self.last_error = Some(err);
            }
        }
    }

    fn render_root_with_retries(&mut self, lane: Lane) -> Result<RenderOutcome, RenderError> {
        let mut failures = 0u32;
        loop {
            self.stats.renders_started += 1;
            let err = match self.render_root(lane) {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };

            failures += 1;
            let fatal = err.is_fatal_usage();
            if !self.config.allows_retry(failures, fatal) {
                if fatal && !self.config.retry_fatal_usage_errors {
                    return Err(err);
                }
                tracing::warn!(%err, ?lane, attempts = failures, "retry limit reached");
                return Err(RenderError::RetriesExhausted {
                    lane,
                    attempts: failures,
                });
            }
            tracing::debug!(%err, ?lane, attempt = failures, "render attempt failed, retrying");
            self.stats.retries += 1;
        }
    }

    fn render_root(&mut self, lane: Lane) -> Result<RenderOutcome, RenderError> {
        let root = self.prepare_fresh_stack();
        match self.work_loop(root, lane) {
            Ok(RenderOutcome::Completed) => {
                self.root.finished_work = Some(root);
                self.root.finished_lane = lane;
                Ok(RenderOutcome::Completed)
            }
            Ok(RenderOutcome::Interrupted) => {
                self.discard_attempt();
                Ok(RenderOutcome::Interrupted)
            }
            Err(err) => {
                self.discard_attempt();
                Err(err)
            }
        }
    }

    fn prepare_fresh_stack(&mut self) -> NodeId {
        self.arena.begin_pass();
        self.consumed.clear();
        self.root.finished_work = None;
        self.arena.create_work_in_progress(self.root.current, Props::new())
    }

    fn discard_attempt(&mut self) {
        self.consumed.restore_all();
        let released = self.arena.discard_pass();
        tracing::trace!(released, "discarded work in progress");
    }

    fn work_loop(&mut self, root: NodeId, lane: Lane) -> Result<RenderOutcome, RenderError> {
        let mut cx = RenderContext {
            arena: &mut self.arena,
            host: &mut *self.host,
            scheduler: &self.scheduler,
            render_lane: lane,
            consumed: &mut self.consumed,
        };

        let mut next = Some(root);
        while let Some(unit) = next {
            next = perform_unit_of_work(&mut cx, unit, root)?;
            if next.is_some() && self.config.check_preemption && should_yield(cx.scheduler, lane) {
                tracing::debug!(?lane, "higher priority lane pending, yielding");
                return Ok(RenderOutcome::Interrupted);
            }
        }
        Ok(RenderOutcome::Completed)
    }

    fn commit_root(&mut self) {
        let Some(finished) = self.root.finished_work.take() else {
            return;
        };
        let lane = std::mem::replace(&mut self.root.finished_lane, NO_LANE);
        tracing::debug!(?lane, "committing root");

        let node = &self.arena[finished];
        let released = if (node.flags | node.subtree_flags).intersects(MUTATION_MASK) {
            commit_mutation_effects(&mut self.arena, &mut *self.host, finished, self.root.container)
        } else {
            Vec::new()
        };

        self.root.current = finished;
        self.scheduler.lanes().lock().mark_root_finished(lane);

        for id in released {
            self.arena.release(id);
        }
        self.consumed.clear();
        self.arena.complete_pass();
        self.stats.commits += 1;
    }

    /// Counters so far.
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            live_work_nodes: self.arena.len(),
            ..self.stats.clone()
        }
    }

    /// The error that made the most recent lane give up, if any.
    pub fn last_error(&self) -> Option<&RenderError> {
        self.last_error.as_ref()
    }

    /// The committed root work node.
    pub fn current_root(&self) -> NodeId {
        self.root.current
    }

    pub fn container(&self) -> InstanceId {
        self.root.container
    }

    /// A work node of either buffer, if it is still alive.
    pub fn node(&self, id: NodeId) -> Option<&WorkNode> {
        self.arena.get(id)
    }

    pub fn arena(&self) -> &FiberArena {
        &self.arena
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub(crate) fn scheduler(&self) -> &ScheduleHandle {
        &self.scheduler
    }

    pub(crate) fn root_queue(&self) -> &SharedQueue<Node> {
        &self.root_queue
    }
}

fn should_yield(scheduler: &ScheduleHandle, lane: Lane) -> bool {
    is_higher_priority(scheduler.lanes().lock().next_lane(), lane)
}
