//! Integration Tests for the Tracking Core
//!
//! These tests drive the tracker end to end: mutations through the
//! dispatch table, change delivery on tick, provenance chains feeding
//! commit attribution, and the aggregators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use signalscope_core::dom::DomNode;
use signalscope_core::reactive::{ReactionKind, ReactionNode, SignalCell};
use signalscope_core::time::Clock;
use signalscope_core::track::{ChangeEvent, EffectTimingReport, MutationOp};
use signalscope_core::Tracker;

fn tracker_at(start_ms: u64) -> (Tracker, Clock) {
    let clock = Clock::manual(start_ms);
    (Tracker::with_clock(clock.clone()), clock)
}

/// A set delivers exactly one change event, and only after a tick.
#[test]
fn set_delivers_one_change_event_after_tick() {
    let (tracker, _clock) = tracker_at(1_000);
    let count = SignalCell::labeled("count", json!(0));

    let events: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let _sub = tracker.on_change(move |event| {
        events_clone.lock().unwrap().push(event.clone());
    });

    tracker.set(&count, json!(5));
    assert_eq!(count.value(), json!(5));
    assert!(events.lock().unwrap().is_empty());

    tracker.tick();
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label.as_deref(), Some("count"));
    assert_eq!(events[0].old_value, json!(0));
    assert_eq!(events[0].new_value, json!(5));
    assert_eq!(events[0].timestamp, 1_000);
    assert_eq!(events[0].mutation.operation, MutationOp::Set);
}

/// Write events fire synchronously, before any tick.
#[test]
fn write_events_are_synchronous() {
    let (tracker, _clock) = tracker_at(0);
    let count = SignalCell::labeled("count", json!(0));

    let writes = Arc::new(AtomicUsize::new(0));
    let writes_clone = writes.clone();
    let _sub = tracker.on_write(move |_| {
        writes_clone.fetch_add(1, Ordering::SeqCst);
    });

    tracker.set(&count, json!(1));
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    // A redundant write is still a write attempt.
    tracker.set(&count, json!(1));
    assert_eq!(writes.load(Ordering::SeqCst), 2);
}

/// Same-value writes never reach the change stream; they accumulate in
/// the redundant-write record for the label instead.
#[test]
fn redundant_writes_are_aggregated_not_delivered() {
    let (tracker, _clock) = tracker_at(2_000);
    let flag = SignalCell::labeled("isOpen", json!(false));

    let changes = Arc::new(AtomicUsize::new(0));
    let changes_clone = changes.clone();
    let _sub = tracker.on_change(move |_| {
        changes_clone.fetch_add(1, Ordering::SeqCst);
    });

    let redundant = Arc::new(AtomicUsize::new(0));
    let redundant_clone = redundant.clone();
    let _sub2 = tracker.on_redundant_write(move |record| {
        redundant_clone.store(record.count as usize, Ordering::SeqCst);
    });

    tracker.set(&flag, json!(false));
    tracker.set(&flag, json!(false));
    tracker.tick();

    assert_eq!(changes.load(Ordering::SeqCst), 0);
    assert_eq!(redundant.load(Ordering::SeqCst), 2);

    let records = tracker.redundant_writes();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "isOpen");
    assert_eq!(records[0].count, 2);
    assert_eq!(records[0].operation, MutationOp::Set);
    assert_eq!(records[0].last_timestamp, 2_000);

    tracker.clear_redundant_writes();
    assert!(tracker.redundant_writes().is_empty());
}

/// Redundant writes on cells without a usable label are dropped rather
/// than bucketed under an empty key.
#[test]
fn unlabeled_redundant_writes_are_dropped() {
    let (tracker, _clock) = tracker_at(0);
    let blank = SignalCell::labeled("", json!(0));
    let unnamed = SignalCell::new(json!(0));

    let redundant = Arc::new(AtomicUsize::new(0));
    let redundant_clone = redundant.clone();
    let _sub = tracker.on_redundant_write(move |_| {
        redundant_clone.fetch_add(1, Ordering::SeqCst);
    });

    tracker.set(&blank, json!(0));
    tracker.set(&blank, json!(0));
    tracker.set(&unnamed, json!(0));

    assert_eq!(redundant.load(Ordering::SeqCst), 0);
    assert!(tracker.redundant_writes().is_empty());
}

/// `update` hands back the pre-mutation value; `update_pre` the
/// post-mutation value. Both commit the same new state.
#[test]
fn update_and_update_pre_return_conventions() {
    let (tracker, _clock) = tracker_at(0);
    let count = SignalCell::labeled("count", json!(10));

    assert_eq!(tracker.update(&count, 1.0), json!(10));
    assert_eq!(count.value(), json!(11));

    assert_eq!(tracker.update_pre(&count, 1.0), json!(12));
    assert_eq!(count.value(), json!(12));
}

/// A write issued from inside a change handler commits normally but
/// produces no further change event.
#[test]
fn writes_during_delivery_commit_but_stay_silent() {
    let (tracker, _clock) = tracker_at(0);
    let tracker = Arc::new(tracker);
    let count = SignalCell::labeled("count", json!(0));
    let mirror = SignalCell::labeled("mirror", json!(0));

    let changes = Arc::new(AtomicUsize::new(0));
    let changes_clone = changes.clone();
    let tracker_clone = tracker.clone();
    let mirror_clone = mirror.clone();
    let _sub = tracker.on_change(move |event| {
        changes_clone.fetch_add(1, Ordering::SeqCst);
        tracker_clone.set(&mirror_clone, event.new_value.clone());
    });

    tracker.set(&count, json!(7));
    tracker.tick();

    // The nested write landed but was suppressed from the stream.
    assert_eq!(mirror.value(), json!(7));
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    // Nothing left over for the next tick either.
    tracker.tick();
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

/// Downstream reactions are classified per mutation: derived values that
/// re-ran report `updated: true`, effects that did not run report false,
/// and reactions behind a derived value are reached transitively.
#[test]
fn downstream_reactions_are_classified() {
    let (tracker, _clock) = tracker_at(0);
    let count = SignalCell::labeled("count", json!(0));

    let double = ReactionNode::new(ReactionKind::Derived, Some("double"));
    let log_effect =
        ReactionNode::with_names(ReactionKind::Effect, None, Some("logCount"), Some("Counter"));
    let render_effect = ReactionNode::new(ReactionKind::Effect, None);

    count.attach(&double);
    count.attach(&log_effect);
    double.attach(&render_effect);

    let events: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let _sub = tracker.on_change(move |event| {
        events_clone.lock().unwrap().push(event.clone());
    });

    tracker.set(&count, json!(1));
    tracker.tick();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let downstream = &events[0].downstream;
    assert_eq!(downstream.len(), 3);

    let derived = downstream
        .iter()
        .find(|r| r.kind == ReactionKind::Derived)
        .unwrap();
    assert_eq!(derived.label.as_deref(), Some("double"));
    assert!(derived.updated);

    let named_effect = downstream
        .iter()
        .find(|r| r.fn_name.as_deref() == Some("logCount"))
        .unwrap();
    assert_eq!(named_effect.kind, ReactionKind::Effect);
    assert_eq!(named_effect.component_name.as_deref(), Some("Counter"));
    assert!(!named_effect.updated);

    // The effect behind the derived value was reached transitively.
    assert!(downstream
        .iter()
        .any(|r| r.kind == ReactionKind::Effect && r.fn_name.is_none()));
}

/// A read chain assembled through nested tracked reads attributes the
/// following commit, flashing the target with the full chain.
#[test]
fn read_chain_attributes_commit_flash() {
    let (tracker, clock) = tracker_at(5_000);
    let count = SignalCell::labeled("count", json!(1));

    let chains: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let chains_clone = chains.clone();
    let _sub = tracker.on_read(move |event| {
        chains_clone.lock().unwrap().push(event.chain.clone());
    });

    // A delivered change marks "count" as the active source.
    tracker.set(&count, json!(2));
    tracker.tick();

    // Derived read: double reads count.
    let value = tracker.track_read(Some("double"), || tracker.read(&count));
    assert_eq!(value, json!(2));

    {
        let chains = chains.lock().unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].as_deref(), Some("count > double"));
    }

    let parent = DomNode::element();
    let text = DomNode::text("2");
    parent.append_child(&text);

    tracker.commit(signalscope_core::track::CommitOp::Text, &text, || {
        text.set_text("4");
    });

    // The flash lands on the nearest element, carrying the chain.
    assert_eq!(
        parent
            .attribute(signalscope_core::track::visual::SOURCE_ATTR)
            .as_deref(),
        Some("count > double")
    );
    assert!(tracker.needs_frame());

    clock.advance(1_000);
    tracker.frame();
    assert!(parent
        .attribute(signalscope_core::track::visual::SOURCE_ATTR)
        .is_none());
}

/// With the heatmap on, repeated attributed commits to one element
/// accumulate into a windowed hit count rendered on that element.
#[test]
fn heatmap_counts_attributed_commits() {
    let (tracker, clock) = tracker_at(10_000);
    tracker.set_rerender_flash_enabled(false);
    tracker.set_heatmap_enabled(true);

    let count = SignalCell::labeled("count", json!(0));
    let element = DomNode::element();

    for step in 1..=3 {
        tracker.set(&count, json!(step));
        tracker.tick();
        tracker.read(&count);
        tracker.commit(signalscope_core::track::CommitOp::Text, &element, || {});
        clock.advance(10);
    }

    tracker.frame();
    assert!(element.has_class(signalscope_core::track::visual::HEATMAP_CLASS));
    assert_eq!(
        element
            .attribute(signalscope_core::track::visual::HEATMAP_LABEL_ATTR)
            .as_deref(),
        Some("count ×3")
    );

    // Past the window the styling decays away.
    clock.advance(5_000);
    tracker.frame();
    assert!(!element.has_class(signalscope_core::track::visual::HEATMAP_CLASS));
}

/// Unsubscribing a handler stops its deliveries without disturbing the
/// rest of the stream.
#[test]
fn unsubscribe_stops_delivery() {
    let (tracker, _clock) = tracker_at(0);
    let count = SignalCell::labeled("count", json!(0));

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    let sub = tracker.on_change(move |_| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    tracker.set(&count, json!(1));
    tracker.tick();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    sub.unsubscribe();
    tracker.set(&count, json!(2));
    tracker.tick();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Double-underscore labels belong to instrumentation internals: the
/// mutation goes through, but no events of any kind are produced.
#[test]
fn reserved_labels_bypass_tracking() {
    let (tracker, _clock) = tracker_at(0);
    let internal = SignalCell::labeled("__monitor_state", json!(0));

    let any_event = Arc::new(AtomicUsize::new(0));
    let a = any_event.clone();
    let _s1 = tracker.on_change(move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    });
    let b = any_event.clone();
    let _s2 = tracker.on_write(move |_| {
        b.fetch_add(1, Ordering::SeqCst);
    });
    let c = any_event.clone();
    let _s3 = tracker.on_read(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    let before = internal.write_version();
    tracker.set(&internal, json!(42));
    tracker.track_read(Some("__monitor_state"), || internal.value());
    tracker.tick();

    assert_eq!(internal.value(), json!(42));
    assert!(internal.write_version() > before);
    assert_eq!(any_event.load(Ordering::SeqCst), 0);
}

/// Timing reports accumulate per identity; reports without one share the
/// anonymous bucket.
#[test]
fn effect_timing_reports_are_bucketed() {
    let (tracker, _clock) = tracker_at(3_000);

    let published = Arc::new(AtomicUsize::new(0));
    let published_clone = published.clone();
    let _sub = tracker.on_effect_profile(move |_| {
        published_clone.fetch_add(1, Ordering::SeqCst);
    });

    tracker.report_effect_timing(EffectTimingReport {
        id: Some("counter-effect".into()),
        label: Some("logCount".into()),
        kind: ReactionKind::Effect,
        duration_ms: 2.0,
    });
    tracker.report_effect_timing(EffectTimingReport {
        id: Some("counter-effect".into()),
        label: None,
        kind: ReactionKind::Effect,
        duration_ms: 6.0,
    });
    tracker.report_effect_timing(EffectTimingReport {
        id: None,
        label: None,
        kind: ReactionKind::Derived,
        duration_ms: 1.0,
    });

    assert_eq!(published.load(Ordering::SeqCst), 3);

    let timings = tracker.effect_timings();
    assert_eq!(timings.len(), 2);

    let named = timings.iter().find(|t| t.id == "counter-effect").unwrap();
    assert_eq!(named.total_runs, 2);
    assert_eq!(named.total_duration_ms, 8.0);
    assert_eq!(named.max_duration_ms, 6.0);
    assert_eq!(named.label.as_deref(), Some("logCount"));
    assert_eq!(named.last_timestamp, 3_000);

    assert!(timings.iter().any(|t| t.id == "anon"));

    tracker.clear_effect_timings();
    assert!(tracker.effect_timings().is_empty());
}
