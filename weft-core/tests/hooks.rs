//! Integration Tests for Hooks
//!
//! These tests drive the hook registry the way a host does: one
//! `with_frame` per render pass, with hook calls in a fixed order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use weft_core::hooks::{
    Cleanup, Context, Event, EventHub, EventTarget, FrameOptions, HookData, HookKind, HookRegistry,
    MemoryStorage,
};
use weft_core::reactive::flush_microtasks;
use weft_core::{Config, HookError};

fn counting_context() -> (Context, Arc<AtomicUsize>) {
    let renders = Arc::new(AtomicUsize::new(0));
    let counter = renders.clone();
    let cx = Context::builder(Arc::new(HookRegistry::new()))
        .render_trigger(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    (cx, renders)
}

/// Test that a patched state record keeps its other fields.
#[test]
fn patch_keeps_unrelated_fields() {
    let registry = HookRegistry::new();
    let handle = registry
        .create(HookKind::State, json!({ "value": 0, "listeners": [] }).into())
        .unwrap();

    handle.patch(&registry, json!({ "value": 1 })).unwrap();

    let data = handle.get(&registry).unwrap();
    assert_eq!(data.as_value(), Some(&json!({ "value": 1, "listeners": [] })));
}

/// Test that a second pass sees the value set between passes, not the
/// initial value.
#[test]
fn state_survives_between_passes() {
    let (cx, renders) = counting_context();

    let (count, set_count) = cx.with_frame("f1", |cx| cx.use_state(0)).unwrap();
    assert_eq!(count, 0);

    set_count.set(7).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let (count, _) = cx.with_frame("f1", |cx| cx.use_state(0)).unwrap();
    assert_eq!(count, 7);
}

/// Test that frames with different ids have independent slots.
#[test]
fn frames_are_isolated() {
    let (cx, _) = counting_context();

    let (_, set_a) = cx.with_frame("a", |cx| cx.use_state("a".to_owned())).unwrap();
    cx.with_frame("b", |cx| cx.use_state("b".to_owned())).unwrap();
    set_a.set("changed".to_owned()).unwrap();

    let (b, _) = cx.with_frame("b", |cx| cx.use_state("b".to_owned())).unwrap();
    let (a, _) = cx.with_frame("a", |cx| cx.use_state("a".to_owned())).unwrap();
    assert_eq!((a.as_str(), b.as_str()), ("changed", "b"));
}

/// Test that reordering hook calls is caught.
#[test]
fn reordered_hooks_fail_with_kind_mismatch() {
    let (cx, _) = counting_context();
    cx.with_frame("f", |cx| {
        cx.use_state(0)?;
        cx.use_id()?;
        Ok(())
    })
    .unwrap();

    let err = cx
        .with_frame("f", |cx| {
            cx.use_id()?;
            cx.use_state(0)?;
            Ok(())
        })
        .unwrap_err();

    match err {
        HookError::HookKindMismatch {
            frame,
            position,
            expected,
            found,
        } => {
            assert_eq!(frame.as_str(), "f");
            assert_eq!(position, 0);
            assert_eq!(expected, HookKind::Id);
            assert_eq!(found, HookKind::State);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cx.registry().active_frame().is_none());
}

/// Test that starting a frame inside another is rejected.
#[test]
fn nested_frames_are_rejected() {
    let (cx, _) = counting_context();
    let err = cx
        .with_frame("outer", |cx| cx.with_frame("inner", |cx| cx.use_id()))
        .unwrap_err();

    assert!(matches!(err, HookError::FrameReentrancy { .. }));
}

/// Test that one failing effect does not affect its siblings or the state.
#[test]
fn failing_effect_is_isolated() {
    let (cx, _) = counting_context();
    let log = Arc::new(Mutex::new(Vec::new()));

    let sink = log.clone();
    let (count, _) = cx
        .with_frame("f", |cx| {
            let state = cx.use_state(3)?;
            cx.use_effect(None, || panic!("effect exploded"))?;
            cx.use_effect(None, move || {
                sink.lock().push("second effect");
                None
            })?;
            Ok(state)
        })
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(*log.lock(), vec!["second effect"]);
}

/// Test the mount/update/unmount lifecycle of an effect with cleanup.
#[test]
fn effect_cleanup_runs_before_rerun_and_on_clear() {
    let (cx, _) = counting_context();
    let log = Arc::new(Mutex::new(Vec::new()));

    let pass = |dep: i32| {
        let log = log.clone();
        cx.with_frame("effect", |cx| {
            cx.use_effect(Some(&[json!(dep)][..]), move || {
                log.lock().push(format!("subscribe {dep}"));
                let log = log.clone();
                Some(Box::new(move || log.lock().push(format!("unsubscribe {dep}"))) as Cleanup)
            })
        })
        .unwrap();
    };

    pass(1);
    pass(1);
    pass(2);
    cx.clear_frame("effect").unwrap();

    assert_eq!(
        *log.lock(),
        vec!["subscribe 1", "unsubscribe 1", "subscribe 2", "unsubscribe 2"]
    );
}

/// Test that an event listener is attached once and always uses the latest
/// handler.
#[test]
fn event_listener_uses_latest_handler() {
    let (cx, _) = counting_context();
    let hub = Arc::new(EventHub::new());
    let target: Arc<dyn EventTarget> = hub.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for generation in 1..=2 {
        let seen = seen.clone();
        let target = target.clone();
        cx.with_frame("listener", |cx| {
            cx.use_event_listener(target, "ping", move |event: &Event| {
                seen.lock().push((generation, event.detail.clone()))
            })
        })
        .unwrap();
    }

    assert_eq!(hub.listener_count("ping"), 1);
    hub.dispatch(&Event::new("ping").with_detail(json!("hello")));
    assert_eq!(*seen.lock(), vec![(2, json!("hello"))]);

    cx.clear_frame("listener").unwrap();
    assert_eq!(hub.listener_count("ping"), 0);
}

/// Test that changing the event name re-attaches the listener.
#[test]
fn event_listener_rebinds_on_new_event() {
    let (cx, _) = counting_context();
    let hub = Arc::new(EventHub::new());
    let target: Arc<dyn EventTarget> = hub.clone();

    for event in ["focus", "blur"] {
        let target = target.clone();
        cx.with_frame("listener", |cx| cx.use_event_listener(target, event, |_: &Event| {}))
            .unwrap();
    }

    assert_eq!(hub.listener_count("focus"), 0);
    assert_eq!(hub.listener_count("blur"), 1);
}

/// Test that storage, transition and id hooks coexist in one frame.
#[test]
fn mixed_hooks_keep_their_slots() {
    let storage = Arc::new(MemoryStorage::new());
    let config = Config {
        id_prefix: "cmp-".into(),
        ..Config::default()
    };
    let cx = Context::builder(Arc::new(HookRegistry::new()))
        .storage(storage.clone())
        .config(config)
        .build();

    let render = |cx: &Context| -> weft_core::Result<_> {
        let id = cx.use_id()?;
        let (volume, set_volume) = cx.use_storage("volume", 5_u8)?;
        let (pending, transition) = cx.use_transition()?;
        Ok((id, volume, set_volume, pending, transition))
    };

    let (id, volume, set_volume, pending, transition) = cx.with_frame("mixed", render).unwrap();
    assert_eq!((id.as_str(), volume, pending), ("cmp-1", 5, false));

    set_volume.set(8).unwrap();
    transition.start(|| {}).unwrap();

    let (id, volume, _, pending, _) = cx.with_frame("mixed", render).unwrap();
    assert_eq!((id.as_str(), volume, pending), ("cmp-1", 8, true));

    flush_microtasks();
    let (_, _, _, pending, _) = cx.with_frame("mixed", render).unwrap();
    assert!(!pending);
    assert_eq!(storage.len(), 1);
}

/// Test that hook counts are recorded per pass.
#[test]
fn frame_statistics_are_reported() {
    let registry = Arc::new(HookRegistry::new());
    let cx = Context::builder(registry.clone()).build();

    for _ in 0..3 {
        cx.with_frame_options("stats", FrameOptions::default(), |cx| {
            cx.use_state(0)?;
            cx.use_ref(0_u64)?;
            Ok(())
        })
        .unwrap();
    }

    let frame = registry.frames().frame(&"stats".into()).unwrap();
    assert_eq!(frame.render_count(), 3);
    assert_eq!(frame.last_hook_count(), Some(2));
    assert_eq!(registry.handles_by_kind(HookKind::Ref).len(), 1);
    assert!(matches!(
        registry.lookup_by_kind(HookKind::Ref).as_slice(),
        [HookData::Cell(_)]
    ));
}

/// Test that queued writes apply in the order they were awaited.
#[tokio::test]
async fn queued_writes_apply_in_order() {
    let registry = Arc::new(HookRegistry::new());
    let handle = registry
        .create(HookKind::State, json!({ "value": 0 }).into())
        .unwrap();

    let first = registry.write_queued(handle, json!({ "value": 1 }).into());
    let second = registry.write_queued(handle, json!({ "value": 2 }).into());
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(
        registry.read(handle).unwrap().as_value(),
        Some(&json!({ "value": 2 }))
    );
}
