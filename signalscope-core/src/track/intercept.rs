//! Primitive Interceptor
//!
//! The lowest layer of the tracking core: the closed set of mutation
//! primitives the host instrumentation routes state writes through, and
//! the call-site metadata captured alongside each mutation.
//!
//! # Dispatch Table
//!
//! Rather than patching ambient call sites, the primitives live in an
//! explicit dispatch table built once at tracker startup: a fixed mapping
//! from operation kind to a boxed implementation. The tracker wraps every
//! application of a primitive with value/version capture, downstream
//! snapshotting, and event assembly; the primitive itself commits the
//! value and notifies dependents, and is invoked exactly once per write.
//!
//! # Reserved Labels
//!
//! Cells whose label starts with the reserved prefix belong to the
//! tracker's own instrumentation (or its dashboard) and pass through
//! unmodified, with no event emission, to avoid feedback loops.

use std::backtrace::{Backtrace, BacktraceStatus};

use serde_json::Value;

use crate::reactive::SignalCell;

use super::events::{MutationMeta, MutationOp};

/// Labels starting with this prefix are never instrumented.
pub const RESERVED_LABEL_PREFIX: &str = "__";

/// Frames containing these tokens are skipped when resolving a callsite.
const STACK_IGNORE: &[&str] = &["signalscope_core::", "std::", "core::", "/rustc/"];

/// How many frames the stack preview keeps.
const STACK_PREVIEW_FRAMES: usize = 6;

/// Whether a label belongs to the tracker's own instrumentation.
pub fn is_reserved_label(label: Option<&str>) -> bool {
    label.is_some_and(|l| l.starts_with(RESERVED_LABEL_PREFIX))
}

/// The argument a mutation primitive receives.
#[derive(Debug, Clone)]
pub enum MutationInput {
    /// A value to commit (assignment and in-place mutation).
    Assign(Value),

    /// A numeric delta (increments and decrements).
    Delta(f64),
}

impl MutationInput {
    fn into_value(self) -> Value {
        match self {
            MutationInput::Assign(value) => value,
            MutationInput::Delta(delta) => Value::from(delta),
        }
    }

    fn into_delta(self) -> f64 {
        match self {
            MutationInput::Delta(delta) => delta,
            MutationInput::Assign(value) => value.as_f64().unwrap_or(0.0),
        }
    }
}

type MutationPrimitive = Box<dyn Fn(&SignalCell, MutationInput) -> Value + Send + Sync>;

/// Fixed mapping from operation kind to its wrapped implementation,
/// constructed once per tracker.
pub struct DispatchTable {
    set: MutationPrimitive,
    update: MutationPrimitive,
    update_pre: MutationPrimitive,
    mutate: MutationPrimitive,
}

impl DispatchTable {
    /// Build the standard primitives.
    ///
    /// Return-value convention follows the operations they stand in for:
    /// `set` and `mutate` return the committed value, `update`
    /// (post-increment) returns the old value, `update_pre` the new one.
    pub fn new() -> Self {
        Self {
            set: Box::new(|cell, input| {
                let value = input.into_value();
                if cell.commit(value.clone()) {
                    cell.notify_dependents();
                }
                value
            }),
            update: Box::new(|cell, input| {
                let old = cell.value();
                let next = numeric_add(&old, input.into_delta());
                if cell.commit(next) {
                    cell.notify_dependents();
                }
                old
            }),
            update_pre: Box::new(|cell, input| {
                let next = numeric_add(&cell.value(), input.into_delta());
                if cell.commit(next.clone()) {
                    cell.notify_dependents();
                }
                next
            }),
            mutate: Box::new(|cell, input| {
                let value = input.into_value();
                if cell.commit(value.clone()) {
                    cell.notify_dependents();
                }
                value
            }),
        }
    }

    /// Invoke the real primitive for `op`. Exactly one invocation per
    /// call.
    pub fn apply(&self, op: MutationOp, cell: &SignalCell, input: MutationInput) -> Value {
        let primitive = match op {
            MutationOp::Set => &self.set,
            MutationOp::Update => &self.update,
            MutationOp::UpdatePre => &self.update_pre,
            MutationOp::Mutate => &self.mutate,
        };
        primitive(cell, input)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Add a delta to a JSON value, preserving integer representation when
/// both sides are integral and the sum stays in range. A non-numeric
/// current value is treated as 0.
fn numeric_add(current: &Value, delta: f64) -> Value {
    if let Some(base) = current.as_i64() {
        if delta.fract() == 0.0 {
            if let Some(sum) = base.checked_add(delta as i64) {
                return Value::from(sum);
            }
        }
    }
    Value::from(current.as_f64().unwrap_or(0.0) + delta)
}

/// Capture best-effort call-site information for a mutation.
///
/// Both fields degrade to `None` when the backtrace is unavailable or
/// every frame is internal.
pub fn mutation_meta(operation: MutationOp) -> MutationMeta {
    let backtrace = Backtrace::force_capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return MutationMeta {
            operation,
            callsite: None,
            stack: None,
        };
    }

    let rendered = backtrace.to_string();
    let frames: Vec<&str> = rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let callsite = frames
        .iter()
        .find(|line| !STACK_IGNORE.iter().any(|token| line.contains(token)))
        .map(|line| (*line).to_owned());
    let preview = frames
        .iter()
        .take(STACK_PREVIEW_FRAMES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    MutationMeta {
        operation,
        callsite,
        stack: (!preview.is_empty()).then_some(preview),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
