//! Error Types
//!
//! Failures inside the tracking core must never propagate into the
//! instrumented call path. The error type here exists for the few places
//! where an internal step can fail in a way the caller should log and
//! degrade from, such as a cyclic dependency graph handed to the
//! downstream snapshot engine.

use thiserror::Error;

/// Errors raised by the tracking core.
///
/// None of these are fatal: callers log the error and continue with a
/// partial event (or no event) instead of throwing into the instrumented
/// program.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The dependency graph reachable from a mutated cell contains a
    /// cycle. The snapshot engine requires a DAG; cyclic input is a
    /// configuration error in the instrumented program, not something
    /// the tracker can classify meaningfully.
    #[error("cyclic dependency detected in reactive graph at `{label}`")]
    CyclicDependencies {
        /// Label of the first node found on a cycle.
        label: String,
    },
}
