//! Signal Cells
//!
//! A `SignalCell` is the reactive state cell the tracker observes. It
//! holds a value, a monotonically increasing write-version counter, and a
//! set of weak back-references to the reactions that depend on it.
//!
//! # Write Versions
//!
//! The write-version changes if and only if a committed value differs
//! structurally from the previous one. Everything downstream (change
//! events, redundant-write accounting, the snapshot engine's `updated`
//! classification) is derived from this single invariant.
//!
//! # Ownership
//!
//! The cell never owns its dependents. Reactions are referenced weakly;
//! when the instrumented program drops a reaction, the stale entry is
//! skipped on the next traversal. The tracker only observes this graph,
//! it does not manage its lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use super::reaction::{ReactionKind, ReactionNode};
use super::NodeId;

/// A reactive state cell with a value, a write-version counter, and a set
/// of dependent reactions.
pub struct SignalCell {
    /// Unique identifier for this cell.
    id: NodeId,

    /// Human-readable label (the variable name, when the host tags one).
    label: Option<String>,

    /// The current value, type-erased for the tracking layer.
    value: RwLock<Value>,

    /// Write-version counter. Bumped only by a value-changing commit.
    write_version: AtomicU64,

    /// Weak back-references to dependent reactions.
    reactions: RwLock<Vec<Weak<ReactionNode>>>,
}

impl SignalCell {
    /// Create a new unlabeled cell with the given initial value.
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(),
            label: None,
            value: RwLock::new(value),
            write_version: AtomicU64::new(0),
            reactions: RwLock::new(Vec::new()),
        })
    }

    /// Create a new labeled cell.
    pub fn labeled(label: &str, value: Value) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(),
            label: Some(label.to_owned()),
            value: RwLock::new(value),
            write_version: AtomicU64::new(0),
            reactions: RwLock::new(Vec::new()),
        })
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the cell's label, if it has one.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get a clone of the current value.
    pub fn value(&self) -> Value {
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Get the current write-version.
    pub fn write_version(&self) -> u64 {
        self.write_version.load(Ordering::SeqCst)
    }

    /// Commit a value. Bumps the write-version and returns `true` only if
    /// the new value differs structurally from the current one.
    pub fn commit(&self, value: Value) -> bool {
        let mut guard = self.value.write().expect("value lock poisoned");
        if *guard == value {
            return false;
        }
        *guard = value;
        self.write_version.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Register a reaction as a dependent of this cell.
    pub fn attach(&self, reaction: &Arc<ReactionNode>) {
        self.reactions
            .write()
            .expect("reactions lock poisoned")
            .push(Arc::downgrade(reaction));
    }

    /// Remove a dependent reaction.
    pub fn detach(&self, id: NodeId) {
        self.reactions
            .write()
            .expect("reactions lock poisoned")
            .retain(|weak| weak.upgrade().map(|r| r.id() != id).unwrap_or(false));
    }

    /// Get the live dependent reactions. Dead weak references are skipped.
    pub fn reactions(&self) -> Vec<Arc<ReactionNode>> {
        self.reactions
            .read()
            .expect("reactions lock poisoned")
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Notify dependents that the value changed.
    ///
    /// Derived reactions recompute synchronously in this model, so their
    /// write-versions are bumped transitively. Effects are only scheduled
    /// by the host; their versions bump when the host actually runs them
    /// via [`ReactionNode::mark_ran`].
    pub fn notify_dependents(&self) {
        let mut queue: Vec<Arc<ReactionNode>> = self.reactions();
        let mut visited = std::collections::HashSet::new();

        while let Some(reaction) = queue.pop() {
            if !visited.insert(reaction.id()) {
                continue;
            }
            if reaction.kind() == ReactionKind::Derived {
                reaction.mark_ran();
                queue.extend(reaction.reactions());
            }
        }
    }
}

impl std::fmt::Debug for SignalCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalCell")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("value", &self.value())
            .field("write_version", &self.write_version())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
