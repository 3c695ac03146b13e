//! Observed Reactive Model
//!
//! This module defines the shapes the tracking core observes: signal
//! cells (mutable state with a write-version counter) and reactions
//! (derived computations and effects depending on them).
//!
//! # Ownership Model
//!
//! The instrumented program creates and destroys these nodes; the tracker
//! never owns them. All cross-references between nodes are weak, so
//! observation does not extend any node's lifetime. A dependency edge
//! that goes dead between two traversals is simply skipped.
//!
//! # Versioning
//!
//! Both cells and reactions carry a write-version counter. A cell's
//! version bumps only when a committed value actually differs; a
//! reaction's version bumps each time it re-runs. Comparing versions
//! across a mutation is how the tracker classifies which downstream
//! computations were really invalidated, without instrumenting their
//! bodies.

mod id;
mod reaction;
mod signal;

pub use id::NodeId;
pub use reaction::{ReactionKind, ReactionNode};
pub use signal::SignalCell;
