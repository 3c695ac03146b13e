//! Event and Record Types
//!
//! Everything the tracking core publishes is defined here: the
//! change/read/write events, the aggregated redundant-write and
//! effect-timing records, and the downstream classification rows carried
//! by change events. All types derive `Serialize` so a dashboard consumer
//! can ship them over whatever transport it likes.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

use crate::reactive::ReactionKind;

/// The closed set of tracked mutation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    /// Plain assignment (`count = 5`).
    Set,

    /// Post-mutation increment/decrement (`count++`).
    Update,

    /// Pre-mutation increment/decrement (`++count`).
    UpdatePre,

    /// In-place object mutation.
    Mutate,
}

/// The closed set of tracked UI commit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOp {
    Text,
    Attribute,
    Class,
    Style,
    Value,
    Checked,
    Selected,
}

/// Best-effort description of where a mutation came from.
///
/// Derived once per mutation and discarded after the event is emitted.
/// Both location fields degrade to `None` when call-stack information is
/// unavailable.
#[derive(Debug, Clone, Serialize)]
pub struct MutationMeta {
    /// Which tracked operation performed the mutation.
    pub operation: MutationOp,

    /// First stack frame outside the tracker's own code, if resolvable.
    pub callsite: Option<String>,

    /// Short caller-stack preview (at most a few frames).
    pub stack: Option<String>,
}

/// A version-changing mutation, the unit delivered on the change stream.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    /// Label of the mutated cell.
    pub label: Option<String>,

    /// Value before the mutation.
    pub old_value: Value,

    /// Value after the mutation.
    pub new_value: Value,

    /// Milliseconds timestamp of the mutation.
    pub timestamp: u64,

    /// Operation kind plus call-site description.
    pub mutation: MutationMeta,

    /// Which downstream reactions were reachable, and which re-ran.
    pub downstream: Vec<DownstreamRecord>,
}

/// A single read, emitted for the outermost read of a call tree only.
#[derive(Debug, Clone, Serialize)]
pub struct ReadEvent {
    pub label: Option<String>,
    pub timestamp: u64,

    /// Rendered provenance chain (`"count > double"`).
    pub chain: Option<String>,
}

/// A single write attempt, emitted synchronously whether or not the
/// version changed.
#[derive(Debug, Clone, Serialize)]
pub struct WriteEvent {
    pub label: Option<String>,
    pub timestamp: u64,

    /// Rendered provenance chain of the most recent read, if still fresh.
    pub chain: Option<String>,
}

/// One reachable downstream reaction, classified across the snapshot
/// window of a mutation.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamRecord {
    pub kind: ReactionKind,
    pub label: Option<String>,
    pub fn_name: Option<String>,
    pub component_name: Option<String>,

    /// Write-version captured before the mutation was delegated.
    pub write_version_before: Option<u64>,

    /// Write-version re-read after the mutation returned. `None` when the
    /// reaction vanished inside the snapshot window.
    pub write_version_after: Option<u64>,

    /// True iff both versions are known and differ.
    pub updated: bool,
}

/// Rolling per-label record of writes that did not change the version.
#[derive(Debug, Clone, Serialize)]
pub struct RedundantWriteRecord {
    pub label: String,

    /// How many redundant writes this label has seen.
    pub count: u64,

    /// Operation kind of the most recent redundant write.
    pub operation: MutationOp,

    /// Timestamp of the most recent redundant write.
    pub last_timestamp: u64,
}

/// One recorded run of an effect or derived computation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EffectRun {
    pub duration_ms: f64,
    pub timestamp: u64,
}

/// Rolling per-identity timing record for effect/derived runs.
#[derive(Debug, Clone, Serialize)]
pub struct EffectTimingRecord {
    pub id: String,

    /// Label and kind are retained from the first report for an identity.
    pub label: Option<String>,
    pub kind: ReactionKind,

    /// Bounded ring of recent runs, oldest dropped first.
    pub runs: VecDeque<EffectRun>,

    pub total_runs: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
    pub last_timestamp: u64,
}

/// A single run duration reported by the host instrumentation.
///
/// The tracker stamps the time on receipt. A missing `id` is bucketed
/// under the anonymous key rather than dropped.
#[derive(Debug, Clone)]
pub struct EffectTimingReport {
    pub id: Option<String>,
    pub label: Option<String>,
    pub kind: ReactionKind,
    pub duration_ms: f64,
}
