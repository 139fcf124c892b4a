//! Local State
//!
//! Components keep state between renders in hook cells. A component asks
//! for its cells through the [`Hooks`] context it is handed while it
//! renders, always in the same order, and the Nth call on one render gets
//! the Nth cell of the previous render.
//!
//! # Mount and Update
//!
//! The first render of a position runs with the mount dispatcher: every
//! [`Hooks::use_state`] call allocates a new cell, with its own update queue
//! and [`SetState`] handle. Later renders run with the update dispatcher:
//! each call advances through the committed chain in lockstep, folds the
//! cell's queued updates for the render lane, and hands back the same
//! `SetState` as before.
//!
//! Calling more or fewer hooks than the previous render is a usage error
//! and aborts the attempt ([`HookError`]).
//!
//! # Isolation
//!
//! The new chain is built on the work-in-progress node only. The committed
//! chain is read and never written, so an abandoned attempt leaves it exactly
//! as it was.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::element::{ElementType, Node};
use crate::error::{HookError, RenderError};
use crate::fiber::{MemoizedState, NodeId};
use crate::render::RenderContext;
use crate::scheduler::ScheduleHandle;
use crate::update::{
    create_update, create_update_queue, enqueue_update, normalize_update_lane, process_update_queue,
    request_update_lane, Action, ConsumptionLog, Lane, Processed, SharedQueue, UpdateQueue,
};

type Erased = Arc<dyn Any + Send + Sync>;

/// One local-state cell. The state type is erased; [`Hooks`] restores it.
#[derive(Clone)]
pub struct HookCell {
    /// Holds a `T`.
    state: Erased,
    /// Holds a `Mutex<UpdateQueue<T>>`.
    queue: Erased,
    /// Holds a `SetState<T>`.
    dispatch: Erased,
}

impl fmt::Debug for HookCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HookCell(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatcher {
    Mount,
    Update,
}

/// The hook context of the component being rendered.
///
/// It only exists for the duration of one component call, so local state
/// cannot be touched outside a render.
pub struct Hooks<'a> {
    component: &'a str,
    node: NodeId,
    dispatcher: Dispatcher,
    previous: Vec<HookCell>,
    chain: Vec<HookCell>,
    render_lane: Lane,
    scheduler: &'a ScheduleHandle,
    consumed: &'a mut ConsumptionLog,
}

impl<'a> Hooks<'a> {
    /// A local-state cell initialized to `initial` on mount.
    pub fn use_state<T>(&mut self, initial: T) -> Result<(T, SetState<T>), HookError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.use_state_with(move || initial)
    }

    /// Like [`Hooks::use_state`], computing the initial value lazily. `init`
    /// only runs on mount.
    pub fn use_state_with<T, F>(&mut self, init: F) -> Result<(T, SetState<T>), HookError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        match self.dispatcher {
            Dispatcher::Mount => Ok(self.mount_state(init())),
            Dispatcher::Update => self.update_state(),
        }
    }

    /// Name of the component being rendered.
    pub fn component(&self) -> &str {
        self.component
    }

    /// Whether this render is the component's first.
    pub fn is_mount(&self) -> bool {
        self.dispatcher == Dispatcher::Mount
    }

    fn mount_state<T>(&mut self, initial: T) -> (T, SetState<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let queue: SharedQueue<T> = create_update_queue();
        let set_state = SetState {
            queue: Arc::clone(&queue),
            scheduler: self.scheduler.clone(),
            node: self.node,
        };
        self.chain.push(HookCell {
            state: Arc::new(initial.clone()),
            queue: queue as Erased,
            dispatch: Arc::new(set_state.clone()),
        });
        (initial, set_state)
    }

    fn update_state<T>(&mut self) -> Result<(T, SetState<T>), HookError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let index = self.chain.len();
        let component = self.component;
        let Some(previous) = self.previous.get(index) else {
            return Err(HookError::ExtraHook {
                component: component.to_owned(),
                index,
            });
        };
        let mismatch = || HookError::TypeMismatch {
            component: component.to_owned(),
            index,
        };

        let base = previous
            .state
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(mismatch)?;
        let queue: SharedQueue<T> = Arc::clone(&previous.queue)
            .downcast::<Mutex<UpdateQueue<T>>>()
            .map_err(|_| mismatch())?;
        let set_state = previous
            .dispatch
            .downcast_ref::<SetState<T>>()
            .cloned()
            .ok_or_else(mismatch)?;
        let cell = HookCell {
            state: Arc::clone(&previous.state),
            queue: Arc::clone(&previous.queue),
            dispatch: Arc::clone(&previous.dispatch),
        };

        let taken = queue.lock().take_lane(self.render_lane);
        let Processed { memoized_state } =
            process_update_queue(base, Some(&taken), self.render_lane);
        self.consumed.record(queue, taken);

        self.chain.push(HookCell {
            state: Arc::new(memoized_state.clone()),
            ..cell
        });
        Ok((memoized_state, set_state))
    }

    fn finish(self) -> Result<Vec<HookCell>, HookError> {
        if self.dispatcher == Dispatcher::Update && self.chain.len() < self.previous.len() {
            return Err(HookError::MissingHooks {
                component: self.component.to_owned(),
                expected: self.previous.len(),
                rendered: self.chain.len(),
            });
        }
        Ok(self.chain)
    }
}

/// Call the component at `wip` and store its new hook chain on it.
pub(crate) fn render_with_hooks(
    cx: &mut RenderContext<'_>,
    wip: NodeId,
) -> Result<Node, RenderError> {
    let node = &cx.arena[wip];
    let Some(ElementType::Component(component)) = node.element_type.clone() else {
        tracing::warn!(node = ?wip, "component node without a component, rendering nothing");
        return Ok(Node::Empty);
    };
    let props = node.pending_props.clone();
    let (dispatcher, previous) = match node.alternate {
        Some(current) => (
            Dispatcher::Update,
            cx.arena[current].memoized_state.hooks().to_vec(),
        ),
        None => (Dispatcher::Mount, Vec::new()),
    };

    tracing::trace!(component = component.name(), ?dispatcher, "rendering component");
    let mut hooks = Hooks {
        component: component.name(),
        node: wip,
        dispatcher,
        previous,
        chain: Vec::new(),
        render_lane: cx.render_lane,
        scheduler: cx.scheduler,
        consumed: &mut *cx.consumed,
    };
    let children = component.call(&props, &mut hooks)?;
    let chain = hooks.finish()?;

    cx.arena[wip].memoized_state = MemoizedState::Hooks(chain);
    Ok(children)
}

/// Dispatch handle of one local-state cell.
///
/// Dispatching queues the change and schedules the owning root; the state
/// value itself only changes on the next render. Handles stay valid across
/// renders and may be sent to other threads.
pub struct SetState<T> {
    queue: SharedQueue<T>,
    scheduler: ScheduleHandle,
    node: NodeId,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            scheduler: self.scheduler.clone(),
            node: self.node,
        }
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState").field("node", &self.node).finish()
    }
}

impl<T: Send + 'static> SetState<T> {
    /// Replace the state.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(value));
    }

    /// Fold the state through `f`.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.dispatch(Action::reduce(f));
    }

    pub fn dispatch(&self, action: Action<T>) {
        self.dispatch_with_lane(action, request_update_lane());
    }

    /// Dispatch on an explicit lane. An empty or multi-bit `lane` is
    /// narrowed to a single lane first.
    pub fn dispatch_with_lane(&self, action: Action<T>, lane: Lane) {
        let lane = normalize_update_lane(lane);
        enqueue_update(&mut self.queue.lock(), create_update(action, lane));
        tracing::trace!(node = ?self.node, ?lane, "state update queued");
        self.scheduler.schedule_update(lane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::MicrotaskQueue;
    use crate::update::Lanes;
    use std::sync::Weak;

    struct Harness {
        scheduler: ScheduleHandle,
        consumed: ConsumptionLog,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                scheduler: ScheduleHandle::new(Arc::new(MicrotaskQueue::new()), Weak::new()),
                consumed: ConsumptionLog::default(),
            }
        }

        fn hooks(&mut self, dispatcher: Dispatcher, previous: Vec<HookCell>) -> Hooks<'_> {
            Hooks {
                component: "Test",
                node: NodeId::default(),
                dispatcher,
                previous,
                chain: Vec::new(),
                render_lane: Lanes::SYNC,
                scheduler: &self.scheduler,
                consumed: &mut self.consumed,
            }
        }
    }

    fn mount_two(harness: &mut Harness) -> (Vec<HookCell>, SetState<i32>) {
        let mut hooks = harness.hooks(Dispatcher::Mount, Vec::new());
        let (count, set_count) = hooks.use_state(5).unwrap();
        let (label, _) = hooks.use_state_with(|| "a".to_string()).unwrap();
        assert_eq!((count, label.as_str()), (5, "a"));
        (hooks.finish().unwrap(), set_count)
    }

    #[test]
    fn cells_line_up_by_call_order() {
        let mut harness = Harness::new();
        let (chain, set_count) = mount_two(&mut harness);

        set_count.update(|n| n + 1);
        set_count.update(|n| n + 1);

        let mut hooks = harness.hooks(Dispatcher::Update, chain);
        let (count, _) = hooks.use_state(0).unwrap();
        let (label, _) = hooks.use_state_with(|| -> String { unreachable!() }).unwrap();
        assert_eq!(count, 7);
        assert_eq!(label, "a");
        assert_eq!(hooks.finish().unwrap().len(), 2);
        assert_eq!(harness.consumed.len(), 1);
    }

    #[test]
    fn extra_hook_is_a_usage_error() {
        let mut harness = Harness::new();
        let (chain, _) = mount_two(&mut harness);

        let mut hooks = harness.hooks(Dispatcher::Update, chain);
        hooks.use_state(0).unwrap();
        hooks.use_state(String::new()).unwrap();
        let err = hooks.use_state(0).unwrap_err();
        assert_eq!(
            err,
            HookError::ExtraHook {
                component: "Test".into(),
                index: 2
            }
        );
    }

    #[test]
    fn missing_hook_is_a_usage_error() {
        let mut harness = Harness::new();
        let (chain, _) = mount_two(&mut harness);

        let mut hooks = harness.hooks(Dispatcher::Update, chain);
        hooks.use_state(0).unwrap();
        assert!(matches!(
            hooks.finish(),
            Err(HookError::MissingHooks {
                expected: 2,
                rendered: 1,
                ..
            })
        ));
    }

    #[test]
    fn reading_a_cell_as_another_type_fails() {
        let mut harness = Harness::new();
        let (chain, _) = mount_two(&mut harness);

        let mut hooks = harness.hooks(Dispatcher::Update, chain);
        assert!(matches!(
            hooks.use_state(0u8),
            Err(HookError::TypeMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn dispatch_narrows_malformed_lanes() {
        let mut harness = Harness::new();
        let (chain, set_count) = mount_two(&mut harness);
        set_count.dispatch_with_lane(Action::Replace(9), Lanes::SYNC | Lanes::DEFAULT);
        assert_eq!(harness.scheduler.pending_lanes(), Lanes::SYNC);

        let mut hooks = harness.hooks(Dispatcher::Update, chain);
        let (count, _) = hooks.use_state(0).unwrap();
        assert_eq!(count, 9);
    }

    #[test]
    fn dispatch_marks_the_lane_pending() {
        let mut harness = Harness::new();
        let (_, set_count) = mount_two(&mut harness);
        set_count.dispatch_with_lane(Action::Replace(1), Lanes::DEFAULT);
        assert_eq!(harness.scheduler.pending_lanes(), Lanes::DEFAULT);
    }
}
