//! Event Bus
//!
//! Typed publish/subscribe fan-out for the tracking core. Five
//! independent streams (change, read, write, redundant-write,
//! effect-timing) share one listener-registry implementation.
//!
//! # Delivery Guarantees
//!
//! 1. Every handler invocation is isolated: a panicking subscriber is
//!    caught and logged, and neither the remaining subscribers nor future
//!    events are affected.
//!
//! 2. Delivery iterates over a snapshot of the listener list, so
//!    unsubscribing during a pass never affects that pass but reliably
//!    prevents future deliveries.
//!
//! 3. The change stream is special: events are queued and delivered one
//!    scheduling tick after the triggering mutation returns, and a
//!    single-flight guard suppresses change events produced while a
//!    delivery pass is running. A handler that writes to a cell still
//!    commits the value; it just produces no nested change event.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::events::{
    ChangeEvent, EffectTimingRecord, ReadEvent, RedundantWriteRecord, WriteEvent,
};

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;
type Listeners<E> = Arc<RwLock<Vec<(ListenerId, Handler<E>)>>>;

/// Capability to cancel a subscription.
///
/// Unsubscribing is explicit; dropping the value without calling
/// [`Subscription::unsubscribe`] leaves the listener registered.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Remove the listener. Future events will not be delivered to it; a
    /// delivery pass already in flight is unaffected.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// One typed event stream with its own listener registry.
struct Stream<E> {
    listeners: Listeners<E>,
}

impl<E: 'static> Stream<E> {
    fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push((id, Arc::new(handler)));

        let weak: Weak<RwLock<Vec<(ListenerId, Handler<E>)>>> = Arc::downgrade(&self.listeners);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners
                        .write()
                        .expect("listener lock poisoned")
                        .retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    fn emit(&self, event: &E) {
        // Snapshot the handlers so unsubscribing mid-pass cannot affect
        // the current pass.
        let snapshot: Vec<Handler<E>> = self
            .listeners
            .read()
            .expect("listener lock poisoned")
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!("tracking subscriber panicked; remaining subscribers still run");
            }
        }
    }
}

/// The typed event bus all tracking output flows through.
pub struct EventBus {
    change: Stream<ChangeEvent>,
    read: Stream<ReadEvent>,
    write: Stream<WriteEvent>,
    redundant: Stream<RedundantWriteRecord>,
    effect: Stream<EffectTimingRecord>,

    /// Change events awaiting the next scheduling tick, in write order.
    pending: Mutex<VecDeque<ChangeEvent>>,

    /// Single-flight guard for change delivery.
    emitting: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            change: Stream::new(),
            read: Stream::new(),
            write: Stream::new(),
            redundant: Stream::new(),
            effect: Stream::new(),
            pending: Mutex::new(VecDeque::new()),
            emitting: AtomicBool::new(false),
        }
    }

    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.change.subscribe(handler)
    }

    pub fn on_read<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ReadEvent) + Send + Sync + 'static,
    {
        self.read.subscribe(handler)
    }

    pub fn on_write<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WriteEvent) + Send + Sync + 'static,
    {
        self.write.subscribe(handler)
    }

    pub fn on_redundant_write<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RedundantWriteRecord) + Send + Sync + 'static,
    {
        self.redundant.subscribe(handler)
    }

    pub fn on_effect_profile<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EffectTimingRecord) + Send + Sync + 'static,
    {
        self.effect.subscribe(handler)
    }

    /// Whether a change-delivery pass is currently running.
    pub fn is_emitting(&self) -> bool {
        self.emitting.load(Ordering::SeqCst)
    }

    /// Queue a change event for delivery on the next tick.
    ///
    /// Events produced while a delivery pass is running are suppressed:
    /// the value has already been committed, only the notification is
    /// dropped.
    pub fn enqueue_change(&self, event: ChangeEvent) {
        if self.is_emitting() {
            tracing::debug!(label = ?event.label, "re-entrant change suppressed");
            return;
        }
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .push_back(event);
    }

    /// Deliver all queued change events, in write order.
    ///
    /// `before_each` runs ahead of each event's fan-out (the tracker uses
    /// it to refresh the active source label).
    pub fn dispatch_pending<F>(&self, mut before_each: F)
    where
        F: FnMut(&ChangeEvent),
    {
        let events: Vec<ChangeEvent> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.drain(..).collect()
        };
        if events.is_empty() {
            return;
        }

        self.emitting.store(true, Ordering::SeqCst);
        for event in &events {
            before_each(event);
            self.change.emit(event);
        }
        self.emitting.store(false, Ordering::SeqCst);
    }

    pub fn emit_read(&self, event: &ReadEvent) {
        self.read.emit(event);
    }

    pub fn emit_write(&self, event: &WriteEvent) {
        self.write.emit(event);
    }

    pub fn emit_redundant(&self, record: &RedundantWriteRecord) {
        self.redundant.emit(record);
    }

    pub fn emit_effect(&self, record: &EffectTimingRecord) {
        self.effect.emit(record);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
