//! Node identity for the observed reactive graph.
//!
//! Every observed entity (state cell, reaction, UI node) gets a
//! process-unique ID when created. The tracker keys all of its non-owning
//! side tables by this ID, never by reference, so tracked entities can be
//! dropped by the instrumented program at any time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node observed by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        let c = NodeId::new();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
