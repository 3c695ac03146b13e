//! Signalscope Core
//!
//! This crate provides a runtime observability layer for fine-grained
//! reactive state. It wraps a host runtime's primitives and reports on
//! them:
//!
//! - Mutation interception (set / update / mutate) with callsite capture
//! - Read-provenance chains linking UI commits back to source signals
//! - Downstream dependency snapshots classified per mutation
//! - Redundant-write and effect-timing aggregation
//! - Flash and heatmap visual feedback on committed UI nodes
//!
//! The crate never schedules or recomputes anything itself; the host
//! runtime stays in charge and the tracker only watches.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the observed model of signals and reactions
//! - `dom`: the observed model of UI nodes
//! - `track`: the tracking core (events, bus, provenance, snapshots,
//!   interception, aggregation, visual feedback)
//! - `time`: the clock abstraction (system or manual)
//!
//! # Example
//!
//! ```rust,ignore
//! use signalscope_core::reactive::SignalCell;
//! use signalscope_core::Tracker;
//! use serde_json::json;
//!
//! let tracker = Tracker::new();
//! let count = SignalCell::labeled("count", json!(0));
//!
//! let sub = tracker.on_change(|event| {
//!     println!("{:?} changed: {:?} -> {:?}", event.label, event.old_value, event.new_value);
//! });
//!
//! tracker.set(&count, json!(5));
//! tracker.tick(); // delivers the change event
//! sub.unsubscribe();
//! ```

pub mod dom;
pub mod error;
pub mod reactive;
pub mod time;
pub mod track;

pub use error::TrackerError;
pub use time::Clock;
pub use track::{Subscription, Tracker};
