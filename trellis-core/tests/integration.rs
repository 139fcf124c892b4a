//! Integration Tests for the Reconciler
//!
//! These tests mount real roots onto the in-memory host and verify the
//! committed host tree, the host operations that produced it, and the
//! reconciler's own bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::element::{Component, Element, Handler, Node, PropValue};
use trellis_core::error::{HookError, RenderError};
use trellis_core::fiber::{Flags, NodeId};
use trellis_core::hooks::SetState;
use trellis_core::host::{HostOp, InstanceId, MemoryHost};
use trellis_core::root::{create_root, create_root_with_config, RootHandle};
use trellis_core::scheduler::MicrotaskQueue;
use trellis_core::update::{Action, Lanes};
use trellis_core::ReconcilerConfig;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mount() -> (MemoryHost, InstanceId, RootHandle) {
    init_tracing();
    let host = MemoryHost::new();
    let container = host.create_container();
    let root = create_root(container, host.clone());
    (host, container, root)
}

fn mount_with(config: ReconcilerConfig) -> (MemoryHost, InstanceId, RootHandle) {
    init_tracing();
    let host = MemoryHost::new();
    let container = host.create_container();
    let root = create_root_with_config(container, host.clone(), config, MicrotaskQueue::new());
    (host, container, root)
}

fn span(text: &str) -> Node {
    Element::host("span").with_child(text).into()
}

fn keyed(tag: &str, key: &str) -> Node {
    Element::host(tag).with_key(key).with_child(key).into()
}

/// Union of every flag left anywhere in the committed tree.
fn residual_flags(root: &RootHandle) -> Flags {
    root.inspect(|reconciler| {
        let arena = reconciler.arena();
        let mut flags = Flags::empty();
        let mut stack = vec![reconciler.current_root()];
        while let Some(id) = stack.pop() {
            flags |= arena[id].flags | arena[id].subtree_flags;
            stack.extend(arena.children(id));
        }
        flags
    })
}

/// Work node ids of the children of the root's first child.
fn first_child_children(root: &RootHandle) -> Vec<NodeId> {
    root.inspect(|reconciler| {
        let arena = reconciler.arena();
        let first = arena[reconciler.current_root()].child.expect("root has a child");
        arena.children(first).collect()
    })
}

/// A counter component that hands its dispatcher out through `slot`.
fn counter(slot: Arc<Mutex<Option<SetState<i32>>>>, renders: Arc<AtomicI32>) -> Component {
    Component::new("Counter", move |_props, hooks| {
        renders.fetch_add(1, Ordering::SeqCst);
        let (count, set_count) = hooks.use_state(5)?;
        *slot.lock() = Some(set_count);
        Ok(Element::host("span").with_child(Node::from(count)).into())
    })
}

/// Test the basic mount: div > span > "x".
#[test]
fn mount_builds_the_host_tree() {
    let (host, container, root) = mount();

    root.render(Element::host("div").with_child(span("x")));

    // Nothing happens until deferred work runs
    assert_eq!(host.markup(container), "");

    assert_eq!(root.flush_sync(), 1);
    assert_eq!(host.markup(container), "<div><span>x</span></div>");
    assert_eq!(residual_flags(&root), Flags::empty());

    let stats = root.stats();
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.renders_started, 1);
}

/// Test that two dispatches in one burst produce exactly one render.
#[test]
fn state_updates_coalesce_into_one_render() {
    let (host, container, root) = mount();
    let slot = Arc::new(Mutex::new(None));
    let renders = Arc::new(AtomicI32::new(0));

    root.render(Element::component(&counter(slot.clone(), renders.clone())));
    root.flush_sync();
    assert_eq!(host.markup(container), "<span>5</span>");
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let set_count = slot.lock().clone().expect("counter rendered");
    set_count.update(|n| n + 1);
    set_count.update(|n| n + 1);

    // Dispatching never renders inline
    assert_eq!(host.markup(container), "<span>5</span>");

    assert_eq!(root.flush_sync(), 1);
    assert_eq!(host.markup(container), "<span>7</span>");
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(root.stats().commits, 2);
}

/// Test that a removed child is detached from the host and released.
#[test]
fn deletion_detaches_removed_subtree() {
    let (host, container, root) = mount();

    root.render(Element::host("div").with_children(vec![span("a"), span("b")]));
    root.flush_sync();
    assert_eq!(host.markup(container), "<div><span>a</span><span>b</span></div>");

    let spans = first_child_children(&root);
    let removed = spans[1];
    let removed_instance = root
        .inspect(|r| r.node(removed).and_then(|n| n.state_node.instance()))
        .expect("span has a host object");
    let div_instance = host.children_of(container)[0];

    host.clear_ops();
    root.render(Element::host("div").with_children(vec![span("a")]));
    root.flush_sync();

    assert_eq!(host.markup(container), "<div><span>a</span></div>");
    assert_eq!(host.children_of(div_instance).len(), 1);
    assert_eq!(host.parent_of(removed_instance), None);
    assert_eq!(
        host.mutations(),
        vec![HostOp::RemoveChild {
            parent: div_instance,
            child: removed_instance
        }]
    );

    // Both buffers of the removed span are gone
    assert!(root.inspect(|r| r.node(removed).is_none()));
    assert_eq!(residual_flags(&root), Flags::empty());
}

/// Test that changing text content issues exactly one text update.
#[test]
fn text_update_sets_content_once() {
    let (host, container, root) = mount();

    root.render(Element::host("p").with_child("1"));
    root.flush_sync();
    let text = host.children_of(host.children_of(container)[0])[0];

    host.clear_ops();
    root.render(Element::host("p").with_child("2"));
    root.flush_sync();

    assert_eq!(host.markup(container), "<p>2</p>");
    assert_eq!(
        host.mutations(),
        vec![HostOp::SetText {
            id: text,
            content: "2".into()
        }]
    );
}

/// Test that rendering the same tree again touches nothing.
#[test]
fn identical_render_is_a_no_op_for_the_host() {
    let (host, _container, root) = mount();
    let tree = || Element::host("div").with_prop("id", "main").with_child(span("x"));

    root.render(tree());
    root.flush_sync();

    host.clear_ops();
    root.render(tree());
    root.flush_sync();

    assert!(host.ops().is_empty());
    assert_eq!(root.stats().commits, 2);
}

/// Test that re-rendering a stable tree never allocates past two buffers.
#[test]
fn work_nodes_are_reused_across_renders() {
    let (_host, _container, root) = mount();
    let tree = || Element::host("div").with_child(span("x"));

    // root, div, span, text
    let positions = 4;
    let mut live = Vec::new();
    for _ in 0..10 {
        root.render(tree());
        root.flush_sync();
        live.push(root.stats().live_work_nodes);
    }

    assert_eq!(live[0], positions + 1);
    assert!(live[1..].iter().all(|&n| n == 2 * positions));
    let total = root.inspect(|r| r.arena().total_allocations());
    assert_eq!(total, 2 * positions as u64);
}

/// Test that only new children are inserted into an existing parent.
#[test]
fn placement_only_on_first_appearance() {
    let (host, container, root) = mount();

    root.render(Element::host("div").with_children(vec![span("a")]));
    root.flush_sync();
    let div = host.children_of(container)[0];
    let a = host.children_of(div)[0];

    host.clear_ops();
    root.render(Element::host("div").with_children(vec![span("a"), span("b")]));
    root.flush_sync();

    let inserted: Vec<HostOp> = host
        .mutations()
        .into_iter()
        .filter(|op| matches!(op, HostOp::AppendChild { parent, .. } | HostOp::InsertBefore { parent, .. } if *parent == div))
        .collect();
    assert_eq!(inserted.len(), 1);
    let b = host.children_of(div)[1];
    assert_eq!(inserted[0], HostOp::AppendChild { parent: div, child: b });
    assert_eq!(host.children_of(div)[0], a);
}

/// Test that a new child in the middle is inserted before its attached sibling.
#[test]
fn insertion_uses_the_next_attached_sibling() {
    let (host, container, root) = mount();

    root.render(Element::host("ul").with_children(vec![keyed("li", "a"), keyed("li", "c")]));
    root.flush_sync();
    let ul = host.children_of(container)[0];
    let c = host.children_of(ul)[1];

    host.clear_ops();
    root.render(Element::host("ul").with_children(vec![
        keyed("li", "a"),
        keyed("li", "b"),
        keyed("li", "c"),
    ]));
    root.flush_sync();

    assert_eq!(host.markup(container), "<ul><li>a</li><li>b</li><li>c</li></ul>");
    let b = host.children_of(ul)[1];
    assert!(host.mutations().contains(&HostOp::InsertBefore {
        parent: ul,
        child: b,
        before: c
    }));
}

/// Test that keyed children move instead of being recreated.
#[test]
fn keyed_children_are_moved() {
    fn list(keys: &[&str]) -> Element {
        Element::host("ul").with_children(keys.iter().map(|k| keyed("li", k)).collect::<Vec<_>>())
    }

    let (host, container, root) = mount();

    root.render(list(&["a", "b", "c"]));
    root.flush_sync();
    let ul = host.children_of(container)[0];
    let before = host.children_of(ul);

    host.clear_ops();
    root.render(list(&["c", "a", "b"]));
    root.flush_sync();

    assert_eq!(host.markup(container), "<ul><li>c</li><li>a</li><li>b</li></ul>");
    let after = host.children_of(ul);
    assert_eq!(after, vec![before[2], before[0], before[1]]);

    // Moves only: nothing created or removed
    assert!(host.ops().iter().all(|op| matches!(
        op,
        HostOp::AppendChild { .. } | HostOp::InsertBefore { .. }
    )));
}

/// Test that nested lists render through fragments.
#[test]
fn nested_lists_render_in_order() {
    let (host, container, root) = mount();

    root.render(Element::host("div").with_children(vec![
        Node::from("a"),
        Node::List(vec!["b".into(), "c".into()]),
        Node::from("d"),
    ]));
    root.flush_sync();
    assert_eq!(host.markup(container), "<div>abcd</div>");

    root.render(Element::host("div").with_children(vec![
        Node::from("a"),
        Node::List(vec!["b".into(), "x".into(), "c".into()]),
        Node::from("d"),
    ]));
    root.flush_sync();
    assert_eq!(host.markup(container), "<div>abxcd</div>");
}

/// Test that changing an element's type replaces it.
#[test]
fn type_change_replaces_the_element() {
    let (host, container, root) = mount();

    root.render(Element::host("div").with_child("x"));
    root.flush_sync();
    let old = host.children_of(container)[0];

    root.render(Element::host("p").with_child("x"));
    root.flush_sync();

    assert_eq!(host.markup(container), "<p>x</p>");
    assert_eq!(host.parent_of(old), None);
}

/// Test that unmounting empties the container and releases the tree.
#[test]
fn unmount_clears_the_container() {
    let (host, container, root) = mount();

    root.render(Element::host("div").with_children(vec![span("a"), span("b")]));
    root.flush_sync();
    root.unmount();
    root.flush_sync();

    assert_eq!(host.markup(container), "");
    assert_eq!(root.rendered(), Node::Empty);
    // Only the root's two buffers remain
    assert_eq!(root.stats().live_work_nodes, 2);
}

/// Test that repeated mount/unmount cycles do not accumulate host objects.
#[test]
fn remounting_releases_host_objects() {
    let (host, container, root) = mount();

    for _ in 0..50 {
        root.render(Element::host("div").with_children(vec![span("a"), span("b")]));
        root.flush_sync();
        root.unmount();
        root.flush_sync();
    }

    assert_eq!(host.markup(container), "");
    assert_eq!(host.object_count(), 1);
}

/// Test that objects built by an abandoned attempt can be pruned.
#[test]
fn abandoned_attempt_objects_are_pruned() {
    let (host, container, root) = mount();
    let fail_next = Arc::new(AtomicBool::new(false));

    let fail_clone = fail_next.clone();
    let flaky = Component::new("Flaky", move |_props, _hooks| {
        if fail_clone.swap(false, Ordering::SeqCst) {
            return Err(RenderError::component("Flaky", "not ready"));
        }
        Ok(Node::from("f"))
    });
    let tree = |leading: Option<Node>| {
        let flaky = Node::from(Element::component(&flaky).with_key("f"));
        Element::host("div").with_children(leading.into_iter().chain([flaky]).collect::<Vec<_>>())
    };

    root.render(tree(None));
    root.flush_sync();

    // The new span and its text are built before the sibling fails
    fail_next.store(true, Ordering::SeqCst);
    root.render(tree(Some(span("x"))));
    root.flush_sync();

    assert_eq!(host.markup(container), "<div><span>x</span>f</div>");
    assert_eq!(root.stats().retries, 1);
    // container, div, span, text, "f"
    assert_eq!(host.object_count(), 7);

    assert_eq!(host.prune_detached(), 2);
    assert_eq!(host.object_count(), 5);
    assert_eq!(host.markup(container), "<div><span>x</span>f</div>");
}

/// Test that a component keeps its state when its parent re-renders.
#[test]
fn component_state_survives_parent_renders() {
    let (host, container, root) = mount();
    let slot = Arc::new(Mutex::new(None));
    let renders = Arc::new(AtomicI32::new(0));
    let component = counter(slot.clone(), renders.clone());
    let tree = |label: &str| {
        Element::host("div").with_children(vec![Node::from(Element::component(&component)), Node::from(label)])
    };

    root.render(tree("first"));
    root.flush_sync();
    slot.lock().clone().unwrap().set(42);
    root.flush_sync();

    root.render(tree("second"));
    root.flush_sync();

    assert_eq!(host.markup(container), "<div><span>42</span>second</div>");
    assert_eq!(renders.load(Ordering::SeqCst), 3);
}

/// Test that updates on different lanes are all processed, highest first.
#[test]
fn lower_lanes_are_processed_after_higher_ones() {
    let (host, container, root) = mount();
    let slot = Arc::new(Mutex::new(None));
    root.render(Element::component(&counter(slot.clone(), Arc::new(AtomicI32::new(0)))));
    root.flush_sync();

    let set_count = slot.lock().clone().unwrap();
    set_count.dispatch_with_lane(Action::reduce(|n: &i32| n * 10), Lanes::IDLE);
    set_count.dispatch_with_lane(Action::reduce(|n: &i32| n + 1), Lanes::SYNC);

    root.flush_sync();

    // SYNC first: 5 + 1, then IDLE: 6 * 10
    assert_eq!(host.markup(container), "<span>60</span>");
    assert_eq!(root.stats().commits, 3);
}

/// Test that updates queued on no lane or on several lanes still render.
#[test]
fn malformed_lanes_are_narrowed_to_one() {
    let (host, container, root) = mount();
    let slot = Arc::new(Mutex::new(None));
    root.render(Element::component(&counter(slot.clone(), Arc::new(AtomicI32::new(0)))));
    root.flush_sync();

    let set_count = slot.lock().clone().unwrap();
    set_count.dispatch_with_lane(Action::Replace(9), Lanes::SYNC | Lanes::DEFAULT);
    root.flush_sync();
    assert_eq!(host.markup(container), "<span>9</span>");

    set_count.dispatch_with_lane(Action::Replace(8), Lanes::empty());
    root.flush_sync();
    assert_eq!(host.markup(container), "<span>8</span>");

    root.render_with_lane(span("root"), Lanes::empty());
    root.flush_sync();
    assert_eq!(host.markup(container), "<span>root</span>");
    assert_eq!(root.flush_sync(), 0);
}

/// Test that a higher-priority update abandons a lower-priority render.
#[test]
fn higher_priority_update_preempts_render() {
    let (host, container, root) = mount();
    let armed = Arc::new(AtomicBool::new(false));

    let armed_clone = armed.clone();
    let trigger = Component::new("Trigger", move |_props, hooks| {
        let (count, set_count) = hooks.use_state(0)?;
        if armed_clone.swap(false, Ordering::SeqCst) {
            set_count.dispatch_with_lane(Action::Replace(1), Lanes::SYNC);
        }
        Ok(Element::host("span").with_child(Node::from(count)).into())
    });
    let tree = |label: &str| {
        Element::host("div").with_children(vec![Node::from(Element::component(&trigger)), Node::from(label)])
    };

    root.render(tree("old"));
    root.flush_sync();
    assert_eq!(host.markup(container), "<div><span>0</span>old</div>");

    armed.store(true, Ordering::SeqCst);
    root.render_with_lane(tree("new"), Lanes::DEFAULT);

    // DEFAULT (interrupted), then SYNC, then DEFAULT again
    assert_eq!(root.flush_sync(), 3);
    assert_eq!(host.markup(container), "<div><span>1</span>new</div>");

    let stats = root.stats();
    assert_eq!(stats.interrupted, 1);
    assert_eq!(stats.commits, 3);
}

/// Test that a failed attempt neither loses nor double-applies updates.
#[test]
fn failed_attempt_restores_consumed_updates() {
    let (host, container, root) = mount();
    let slot = Arc::new(Mutex::new(None));
    let fail_next = Arc::new(AtomicBool::new(false));

    let slot_clone = slot.clone();
    let fail_clone = fail_next.clone();
    let flaky = Component::new("Flaky", move |_props, hooks| {
        let (count, set_count) = hooks.use_state(5)?;
        *slot_clone.lock() = Some(set_count);
        if fail_clone.swap(false, Ordering::SeqCst) {
            return Err(RenderError::component("Flaky", "not ready"));
        }
        Ok(Node::from(count))
    });

    root.render(Element::component(&flaky));
    root.flush_sync();

    fail_next.store(true, Ordering::SeqCst);
    let set_count: SetState<i32> = slot.lock().clone().unwrap();
    set_count.update(|n| n + 1);
    root.flush_sync();

    assert_eq!(host.markup(container), "6");
    let stats = root.stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.renders_started, 3);
    assert_eq!(stats.commits, 2);
}

/// Test that transient failures are retried without limit by default.
///
/// A deterministic failure would spin forever under the default, so this
/// only fails a bounded number of times.
#[test]
fn transient_failures_retry_until_success() {
    let (host, container, root) = mount();
    let failures_left = Arc::new(AtomicI32::new(25));

    let failures_clone = failures_left.clone();
    let flaky = Component::new("Flaky", move |_props, _hooks| {
        if failures_clone.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(RenderError::component("Flaky", "try again"));
        }
        Ok(Node::from("ok"))
    });

    root.render(Element::component(&flaky));
    root.flush_sync();

    assert_eq!(host.markup(container), "ok");
    assert_eq!(root.stats().retries, 25);
}

/// Test that a changed hook count aborts the render and hits the retry cap.
#[test]
fn hook_count_change_is_a_usage_error() {
    let (host, container, root) = mount_with(ReconcilerConfig::default().with_max_render_retries(2));
    let two_hooks = Arc::new(AtomicBool::new(true));

    let two_clone = two_hooks.clone();
    let shifty = Component::new("Shifty", move |_props, hooks| {
        let (a, _) = hooks.use_state(1)?;
        if two_clone.load(Ordering::SeqCst) {
            hooks.use_state(2)?;
        }
        Ok(Node::from(a))
    });

    root.render(Element::component(&shifty));
    root.flush_sync();
    assert_eq!(host.markup(container), "1");

    two_hooks.store(false, Ordering::SeqCst);
    root.render(Element::component(&shifty));
    root.flush_sync();

    // Nothing committed; the host still shows the last good tree
    assert_eq!(host.markup(container), "1");
    let stats = root.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.commits, 1);
    assert_eq!(
        root.inspect(|r| r.last_error().cloned()),
        Some(RenderError::RetriesExhausted {
            lane: Lanes::SYNC,
            attempts: 3
        })
    );
}

/// Test that usage errors can be made final instead of retried.
#[test]
fn extra_hook_fails_immediately_when_not_retried() {
    let config = ReconcilerConfig {
        retry_fatal_usage_errors: false,
        ..Default::default()
    };
    let (_host, _container, root) = mount_with(config);
    let two_hooks = Arc::new(AtomicBool::new(false));

    let two_clone = two_hooks.clone();
    let shifty = Component::new("Shifty", move |_props, hooks| {
        hooks.use_state(1)?;
        if two_clone.load(Ordering::SeqCst) {
            hooks.use_state(2)?;
        }
        Ok(Node::Empty)
    });

    root.render(Element::component(&shifty));
    root.flush_sync();

    two_hooks.store(true, Ordering::SeqCst);
    root.render(Element::component(&shifty));
    root.flush_sync();

    let stats = root.stats();
    assert_eq!(stats.retries, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        root.inspect(|r| r.last_error().cloned()),
        Some(RenderError::Hook(HookError::ExtraHook {
            component: "Shifty".into(),
            index: 1
        }))
    );
}

/// Test that committed properties reach the host for an event layer.
#[test]
fn handlers_are_attached_to_host_objects() {
    let (host, container, root) = mount();
    let clicks = Arc::new(AtomicI32::new(0));

    let clicks_clone = clicks.clone();
    let on_click = Handler::new(move || {
        clicks_clone.fetch_add(1, Ordering::SeqCst);
    });
    root.render(Element::host("button").with_prop("on_click", on_click).with_child("go"));
    root.flush_sync();

    let button = host.children_of(container)[0];
    let props = host.props_of(button).expect("props attached on mount");
    match props.get("on_click") {
        Some(PropValue::Handler(handler)) => handler.call(),
        other => panic!("expected a handler, got {other:?}"),
    }
    assert_eq!(clicks.load(Ordering::SeqCst), 1);

    // A changed attribute flags the element and re-attaches its props
    host.clear_ops();
    root.render(Element::host("button").with_prop("disabled", true).with_child("go"));
    root.flush_sync();
    assert_eq!(host.mutations(), vec![HostOp::AttachProps { id: button }]);
    assert_eq!(
        host.props_of(button).unwrap().get("disabled"),
        Some(&PropValue::Bool(true))
    );
}

/// Test that stats serialize for diagnostics.
#[test]
fn stats_serialize_to_json() {
    let (_host, _container, root) = mount();
    root.render(span("x"));
    root.flush_sync();

    let json = serde_json::to_value(root.stats()).unwrap();
    assert_eq!(json["commits"], 1);
    // root, its alternate, span, text
    assert_eq!(json["live_work_nodes"], 4);
}

/// Test that inspecting a root from inside its own render does not block.
#[test]
fn inspection_during_render_reports_busy() {
    let (host, container, root) = mount();
    let handle: Arc<Mutex<Option<RootHandle>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handle_clone = handle.clone();
    let seen_clone = seen.clone();
    let watcher = Component::new("Watcher", move |_props, _hooks| {
        if let Some(root) = handle_clone.lock().as_ref() {
            seen_clone.lock().push(root.try_inspect(|r| r.stats().commits));
        }
        Ok(Node::from("watching"))
    });

    *handle.lock() = Some(root.clone());
    root.render(Element::component(&watcher));
    root.flush_sync();

    assert_eq!(host.markup(container), "watching");
    assert_eq!(*seen.lock(), vec![None]);
    assert_eq!(root.try_inspect(|r| r.stats().commits), Some(1));

    // The component holds a handle to its own root
    handle.lock().take();
}
