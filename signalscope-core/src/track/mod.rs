//! Signal Tracking Layer
//!
//! Everything observability: the typed event bus, read-provenance
//! chains, downstream snapshots, mutation interception, write/timing
//! aggregation, and the flash/heatmap visual feedback that sits on top.
//!
//! [`Tracker`] is the entry point; the submodules are its moving parts
//! and are exported for hosts that need the raw pieces (a dashboard
//! rendering [`RedundantWriteRecord`]s, say).

pub mod aggregate;
pub mod bus;
pub mod context;
pub mod events;
pub mod intercept;
pub mod provenance;
pub mod snapshot;
pub mod visual;

pub use bus::Subscription;
pub use context::Tracker;
pub use events::{
    ChangeEvent, CommitOp, DownstreamRecord, EffectRun, EffectTimingRecord, EffectTimingReport,
    MutationMeta, MutationOp, ReadEvent, RedundantWriteRecord, WriteEvent,
};
pub use intercept::MutationInput;
pub use visual::ExclusionGuard;
