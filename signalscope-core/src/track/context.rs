//! Tracker Context
//!
//! One explicit object owning all tracking state: the event bus, the
//! provenance builder, the mutation dispatch table, both aggregators, and
//! the visual feedback controller. It is created at startup, passed to
//! whatever needs it, and torn down by dropping it. No ambient globals.
//!
//! # Write Path
//!
//! Every tracked mutation flows through [`Tracker::write`]:
//!
//! 1. Reserved labels pass straight through to the primitive.
//! 2. Mutation metadata, the old value, and the old version are captured.
//! 3. The downstream subgraph is captured (skipped while a change
//!    delivery pass is running; a cyclic graph degrades to an empty
//!    list with a warning).
//! 4. The real primitive runs, exactly once.
//! 5. A write event is emitted synchronously, in write order.
//! 6. If the version changed, the finalized downstream classification is
//!    assembled into a change event and queued for the next tick,
//!    unless a delivery pass is running, in which case the event is
//!    suppressed. If the version did not change and the cell carries a
//!    non-empty label, the redundant-write record for that label is
//!    bumped and republished instead; unlabeled cells are not bucketed.
//!
//! # Scheduling
//!
//! The host's scheduler drives two entry points: [`Tracker::tick`] after
//! each mutation returns (the microtask-equivalent that delivers queued
//! change events), and [`Tracker::frame`] once per display refresh while
//! [`Tracker::needs_frame`] reports pending visual work.

use std::sync::Arc;

use serde_json::Value;

use crate::dom::DomNode;
use crate::reactive::SignalCell;
use crate::time::Clock;

use super::aggregate::{EffectTimingAggregator, RedundantWriteAggregator};
use super::bus::{EventBus, Subscription};
use super::events::{
    ChangeEvent, CommitOp, EffectTimingRecord, EffectTimingReport, MutationOp, ReadEvent,
    RedundantWriteRecord, WriteEvent,
};
use super::intercept::{is_reserved_label, mutation_meta, DispatchTable, MutationInput};
use super::provenance::{render_chain, ProvenanceBuilder};
use super::snapshot;
use super::visual::{ExclusionGuard, VisualFeedback};

/// The tracking core. See the module docs for the overall flow.
pub struct Tracker {
    clock: Clock,
    bus: EventBus,
    provenance: ProvenanceBuilder,
    dispatch: DispatchTable,
    redundant: RedundantWriteAggregator,
    timings: EffectTimingAggregator,
    visual: VisualFeedback,
}

impl Tracker {
    /// Create a tracker on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::system())
    }

    /// Create a tracker on an explicit clock (tests use a manual one).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            provenance: ProvenanceBuilder::new(clock.clone()),
            clock,
            bus: EventBus::new(),
            dispatch: DispatchTable::new(),
            redundant: RedundantWriteAggregator::new(),
            timings: EffectTimingAggregator::new(),
            visual: VisualFeedback::new(),
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Run a tracked mutation primitive against a cell.
    pub fn write(&self, cell: &Arc<SignalCell>, op: MutationOp, input: MutationInput) -> Value {
        let label = cell.label().map(str::to_owned);
        if is_reserved_label(label.as_deref()) {
            // The tracker's own state: no events, no provenance.
            return self.dispatch.apply(op, cell, input);
        }

        let meta = mutation_meta(op);
        let old_value = cell.value();
        let version_before = cell.write_version();

        let suppressing = self.bus.is_emitting();
        let captures = if suppressing {
            Vec::new()
        } else {
            match snapshot::capture(cell) {
                Ok(captures) => captures,
                Err(error) => {
                    tracing::warn!(%error, label = ?label, "downstream snapshot skipped");
                    Vec::new()
                }
            }
        };

        let result = self.dispatch.apply(op, cell, input);
        let now = self.clock.now_ms();

        self.bus.emit_write(&WriteEvent {
            label: label.clone(),
            timestamp: now,
            chain: self.provenance.peek_chain(),
        });

        if cell.write_version() != version_before {
            if suppressing {
                tracing::debug!(label = ?label, "change during delivery suppressed");
            } else {
                self.bus.enqueue_change(ChangeEvent {
                    label,
                    old_value,
                    new_value: cell.value(),
                    timestamp: now,
                    mutation: meta,
                    downstream: snapshot::finalize(captures),
                });
            }
        } else if let Some(label) = label.filter(|l| !l.is_empty()) {
            let record = self.redundant.record(&label, op, now);
            self.bus.emit_redundant(&record);
        }

        result
    }

    /// Plain assignment.
    pub fn set(&self, cell: &Arc<SignalCell>, value: Value) -> Value {
        self.write(cell, MutationOp::Set, MutationInput::Assign(value))
    }

    /// Post-mutation increment/decrement. Returns the old value.
    pub fn update(&self, cell: &Arc<SignalCell>, delta: f64) -> Value {
        self.write(cell, MutationOp::Update, MutationInput::Delta(delta))
    }

    /// Pre-mutation increment/decrement. Returns the new value.
    pub fn update_pre(&self, cell: &Arc<SignalCell>, delta: f64) -> Value {
        self.write(cell, MutationOp::UpdatePre, MutationInput::Delta(delta))
    }

    /// In-place object mutation: the host hands the post-mutation value.
    pub fn mutate(&self, cell: &Arc<SignalCell>, value: Value) -> Value {
        self.write(cell, MutationOp::Mutate, MutationInput::Assign(value))
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Read a cell's value through the tracking layer.
    pub fn read(&self, cell: &Arc<SignalCell>) -> Value {
        let cell = Arc::clone(cell);
        let label = cell.label().map(str::to_owned);
        self.track_read(label.as_deref(), move || cell.value())
    }

    /// Wrap an arbitrary read (a derived computation reading its inputs
    /// through nested `track_read`/[`Tracker::read`] calls).
    ///
    /// Only the outermost read of a call tree finalizes a provenance
    /// chain and emits a read event.
    pub fn track_read<T, F>(&self, label: Option<&str>, delegate: F) -> T
    where
        F: FnOnce() -> T,
    {
        if is_reserved_label(label) {
            return delegate();
        }

        self.provenance.begin_read(label);
        let value = delegate();
        if let Some(chain) = self.provenance.end_read() {
            self.bus.emit_read(&ReadEvent {
                label: label.map(str::to_owned),
                timestamp: self.clock.now_ms(),
                chain: Some(render_chain(&chain)),
            });
        }
        value
    }

    // ------------------------------------------------------------------
    // Commit path
    // ------------------------------------------------------------------

    /// Run a UI commit primitive, then apply visual feedback when the
    /// commit is attributable to a tracked source.
    pub fn commit<F>(&self, op: CommitOp, target: &Arc<DomNode>, apply: F)
    where
        F: FnOnce(),
    {
        apply();

        let chain = self.provenance.take_chain().unwrap_or_default();
        let Some(label) = self.provenance.source_chain(&chain) else {
            return;
        };
        tracing::trace!(operation = ?op, label = %label, "attributed commit");
        self.visual
            .apply_commit_feedback(target, &label, self.clock.now_ms());
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Deliver queued change events, one scheduling tick after their
    /// mutations returned. Delivery refreshes the active source label so
    /// subsequent commits attribute to the most recent change.
    pub fn tick(&self) {
        self.bus.dispatch_pending(|event| {
            if let Some(label) = &event.label {
                self.provenance.set_active_source(label);
            }
        });
    }

    /// Whether visual work is pending for the next display refresh.
    pub fn needs_frame(&self) -> bool {
        self.visual.needs_frame()
    }

    /// One display-refresh pass over flash expiry and heatmap rendering.
    pub fn frame(&self) {
        self.visual.frame(self.clock.now_ms());
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to version-changing mutations.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.bus.on_change(handler)
    }

    /// Subscribe to outermost reads.
    pub fn on_read<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ReadEvent) + Send + Sync + 'static,
    {
        self.bus.on_read(handler)
    }

    /// Subscribe to every write attempt.
    pub fn on_write<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WriteEvent) + Send + Sync + 'static,
    {
        self.bus.on_write(handler)
    }

    /// Subscribe to redundant-write record updates.
    pub fn on_redundant_write<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RedundantWriteRecord) + Send + Sync + 'static,
    {
        self.bus.on_redundant_write(handler)
    }

    /// Subscribe to effect-timing record updates.
    pub fn on_effect_profile<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EffectTimingRecord) + Send + Sync + 'static,
    {
        self.bus.on_effect_profile(handler)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn redundant_writes(&self) -> Vec<RedundantWriteRecord> {
        self.redundant.snapshot()
    }

    pub fn clear_redundant_writes(&self) {
        self.redundant.clear();
    }

    pub fn effect_timings(&self) -> Vec<EffectTimingRecord> {
        self.timings.snapshot()
    }

    pub fn clear_effect_timings(&self) {
        self.timings.clear();
    }

    /// Record a reported effect/derived run duration and republish the
    /// updated record.
    pub fn report_effect_timing(&self, report: EffectTimingReport) {
        let record = self.timings.record(report, self.clock.now_ms());
        self.bus.emit_effect(&record);
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    pub fn set_rerender_flash_enabled(&self, enabled: bool) {
        self.visual.set_flash_enabled(enabled);
    }

    pub fn rerender_flash_enabled(&self) -> bool {
        self.visual.flash_enabled()
    }

    pub fn set_heatmap_enabled(&self, enabled: bool) {
        self.visual.set_heatmap_enabled(enabled);
    }

    pub fn heatmap_enabled(&self) -> bool {
        self.visual.heatmap_enabled()
    }

    /// Register a subtree the flash must never touch (the dashboard's
    /// own mount point).
    pub fn register_flash_exclusion_root(&self, root: &Arc<DomNode>) -> ExclusionGuard {
        self.visual.register_exclusion_root(root)
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
