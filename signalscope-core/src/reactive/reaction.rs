//! Reaction Nodes
//!
//! A `ReactionNode` is a computation that depends on one or more signal
//! cells: either a derived value (itself readable, with its own
//! dependents) or an effect (a side-effecting leaf of the graph).
//!
//! Derived reactions carry their own write-version and dependent list, so
//! they form a directed graph rooted at signal cells. The snapshot engine
//! assumes this graph is acyclic; see the downstream snapshot module for
//! how cyclic input is handled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde::Serialize;

use super::NodeId;

/// The kind of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    /// A derived computation. Readable, versioned, and may have its own
    /// dependents.
    Derived,

    /// A side-effecting computation. A leaf of the dependency graph.
    Effect,
}

/// A derived computation or effect observed by the tracker.
pub struct ReactionNode {
    /// Unique identifier for this reaction.
    id: NodeId,

    /// Whether this is a derived value or an effect.
    kind: ReactionKind,

    /// Human-readable label, when the host tags one.
    label: Option<String>,

    /// Name of the function backing this reaction.
    fn_name: Option<String>,

    /// Name of the owning component.
    component_name: Option<String>,

    /// The reaction's own write-version. Bumped each time it re-runs;
    /// meaningful for version comparison mainly on derived reactions.
    write_version: AtomicU64,

    /// Dependents of a derived reaction. Always empty for effects.
    reactions: RwLock<Vec<Weak<ReactionNode>>>,
}

impl ReactionNode {
    /// Create a new reaction with the given kind and label.
    pub fn new(kind: ReactionKind, label: Option<&str>) -> Arc<Self> {
        Self::with_names(kind, label, None, None)
    }

    /// Create a new reaction with full naming information.
    pub fn with_names(
        kind: ReactionKind,
        label: Option<&str>,
        fn_name: Option<&str>,
        component_name: Option<&str>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(),
            kind,
            label: label.map(str::to_owned),
            fn_name: fn_name.map(str::to_owned),
            component_name: component_name.map(str::to_owned),
            write_version: AtomicU64::new(0),
            reactions: RwLock::new(Vec::new()),
        })
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the reaction's kind.
    pub fn kind(&self) -> ReactionKind {
        self.kind
    }

    /// Get the reaction's label, if it has one.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the backing function name, if known.
    pub fn fn_name(&self) -> Option<&str> {
        self.fn_name.as_deref()
    }

    /// Get the owning component name, if known.
    pub fn component_name(&self) -> Option<&str> {
        self.component_name.as_deref()
    }

    /// Get the reaction's current write-version.
    pub fn write_version(&self) -> u64 {
        self.write_version.load(Ordering::SeqCst)
    }

    /// Record that this reaction ran, bumping its write-version.
    pub fn mark_ran(&self) {
        self.write_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Register a dependent of a derived reaction.
    pub fn attach(&self, reaction: &Arc<ReactionNode>) {
        self.reactions
            .write()
            .expect("reactions lock poisoned")
            .push(Arc::downgrade(reaction));
    }

    /// Get the live dependents. Dead weak references are skipped.
    pub fn reactions(&self) -> Vec<Arc<ReactionNode>> {
        self.reactions
            .read()
            .expect("reactions lock poisoned")
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl std::fmt::Debug for ReactionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("write_version", &self.write_version())
            .finish()
    }
}
