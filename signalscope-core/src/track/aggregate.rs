//! Rolling Aggregators
//!
//! Two per-label statistics stores fed by the write and effect-timing
//! streams: redundant-write counts and effect run timings. Both are
//! append-mostly with bounded growth, owned and mutated exclusively here,
//! and queried on demand by the dashboard through snapshot arrays.

use std::collections::VecDeque;
use std::sync::RwLock;

use indexmap::IndexMap;

use super::events::{EffectRun, EffectTimingRecord, EffectTimingReport, MutationOp, RedundantWriteRecord};

/// Maximum retained runs per effect identity; oldest dropped first.
const EFFECT_TIMING_MAX_RUNS: usize = 200;

/// Bucket for reports that carry no identity.
const ANONYMOUS_ID: &str = "anon";

/// Per-label counts of writes that did not change the version.
///
/// Records persist until explicitly cleared.
pub struct RedundantWriteAggregator {
    records: RwLock<IndexMap<String, RedundantWriteRecord>>,
}

impl RedundantWriteAggregator {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
        }
    }

    /// Record a redundant write and return the updated record for
    /// republication.
    pub fn record(&self, label: &str, operation: MutationOp, timestamp: u64) -> RedundantWriteRecord {
        let mut records = self.records.write().expect("records lock poisoned");
        let record = records
            .entry(label.to_owned())
            .or_insert_with(|| RedundantWriteRecord {
                label: label.to_owned(),
                count: 0,
                operation,
                last_timestamp: 0,
            });
        record.count += 1;
        record.operation = operation;
        record.last_timestamp = timestamp;
        record.clone()
    }

    /// Snapshot of all records, in first-seen order.
    pub fn snapshot(&self) -> Vec<RedundantWriteRecord> {
        self.records
            .read()
            .expect("records lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Drop all accumulated state unconditionally.
    pub fn clear(&self) {
        self.records.write().expect("records lock poisoned").clear();
    }
}

impl Default for RedundantWriteAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-identity rolling timing statistics for effect and derived runs.
pub struct EffectTimingAggregator {
    records: RwLock<IndexMap<String, EffectTimingRecord>>,
}

impl EffectTimingAggregator {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
        }
    }

    /// Record a reported run and return the updated record for
    /// republication. Reports without an identity are bucketed under the
    /// anonymous key rather than dropped.
    pub fn record(&self, report: EffectTimingReport, timestamp: u64) -> EffectTimingRecord {
        let id = report
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ANONYMOUS_ID.to_owned());
        let run = EffectRun {
            duration_ms: report.duration_ms,
            timestamp,
        };

        let mut records = self.records.write().expect("records lock poisoned");
        let record = records.entry(id.clone()).or_insert_with(|| EffectTimingRecord {
            id,
            // Label and kind stick with the first report for an identity.
            label: report.label.clone(),
            kind: report.kind,
            runs: VecDeque::new(),
            total_runs: 0,
            total_duration_ms: 0.0,
            max_duration_ms: 0.0,
            last_timestamp: 0,
        });

        record.runs.push_back(run);
        while record.runs.len() > EFFECT_TIMING_MAX_RUNS {
            record.runs.pop_front();
        }
        record.total_runs += 1;
        record.total_duration_ms += report.duration_ms;
        record.max_duration_ms = record.max_duration_ms.max(report.duration_ms);
        record.last_timestamp = timestamp;
        record.clone()
    }

    /// Snapshot of all records, in first-seen order.
    pub fn snapshot(&self) -> Vec<EffectTimingRecord> {
        self.records
            .read()
            .expect("records lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Drop all accumulated state unconditionally.
    pub fn clear(&self) {
        self.records.write().expect("records lock poisoned").clear();
    }
}

impl Default for EffectTimingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
