//! Provenance Builder
//!
//! Reconstructs the causal chain from a visible UI commit back to the
//! state cell that caused it.
//!
//! # How Chains Are Built
//!
//! 1. Every tracked read enters a call-depth-aware label stack. Nested
//!    reads (a derived value reading its inputs) push their labels onto
//!    the same stack.
//!
//! 2. When the outermost read exits, the pushed labels are collected
//!    most-recently-pushed-first and de-duplicated, producing a chain
//!    that runs from the deepest source to the outermost reader.
//!
//! 3. If the chain's head is a derived label whose own input chain is
//!    cached, the cached subchain is prepended, transitively expanding
//!    multi-hop derivations.
//!
//! 4. The finalized chain is held for a short time-to-live and consumed
//!    at most once, by the next UI commit.
//!
//! # Attribution Rule
//!
//! A chain is attributed to the active source label (set when a change
//! event is delivered, expiring after a fixed interval) only when that
//! label literally appears in the chain. Provenance is reported as absent
//! rather than guessed.
//!
//! All TTL state is invalidated lazily on the next read; there are no
//! timers.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use smallvec::SmallVec;

use crate::time::Clock;

/// How long an active source label stays attributable after delivery.
const SOURCE_LABEL_TTL_MS: u64 = 1500;

/// How long a finalized read chain stays consumable.
const READ_CHAIN_TTL_MS: u64 = 100;

/// Maximum nodes rendered in a chain string before the middle collapses.
const CHAIN_MAX_NODES: usize = 4;

/// Placeholder for collapsed middle nodes in a rendered chain.
const CHAIN_ELLIPSIS: &str = "...";

/// A short ordered sequence of labels, deepest source first.
pub type LabelChain = SmallVec<[String; 4]>;

struct ProvenanceState {
    active_source: Option<String>,
    active_source_expires_at: u64,

    read_depth: u32,
    read_stack: SmallVec<[String; 8]>,

    last_chain: Option<LabelChain>,
    last_read_at: u64,

    /// Maps a derived label to the chain of labels that fed its last
    /// computation, for transitive expansion.
    derived_chains: HashMap<String, Vec<String>>,
}

/// Builds and serves provenance chains. One per tracker context.
pub struct ProvenanceBuilder {
    clock: Clock,
    state: Mutex<ProvenanceState>,
}

impl ProvenanceBuilder {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Mutex::new(ProvenanceState {
                active_source: None,
                active_source_expires_at: 0,
                read_depth: 0,
                read_stack: SmallVec::new(),
                last_chain: None,
                last_read_at: 0,
                derived_chains: HashMap::new(),
            }),
        }
    }

    /// Set the active source label, refreshing its time-to-live.
    ///
    /// Called when a change event is delivered; a suppressed delivery
    /// never updates the label.
    pub fn set_active_source(&self, label: &str) {
        if label.is_empty() {
            return;
        }
        let mut state = self.state.lock().expect("provenance lock poisoned");
        state.active_source = Some(label.to_owned());
        state.active_source_expires_at = self.clock.now_ms() + SOURCE_LABEL_TTL_MS;
    }

    /// Get the active source label, if still within its time-to-live.
    pub fn active_source(&self) -> Option<String> {
        let mut state = self.state.lock().expect("provenance lock poisoned");
        if self.clock.now_ms() >= state.active_source_expires_at {
            state.active_source = None;
        }
        state.active_source.clone()
    }

    /// Enter a read. Pushes the label (when present and non-empty) onto
    /// the read stack; the stack resets at the top level.
    pub fn begin_read(&self, label: Option<&str>) {
        let mut state = self.state.lock().expect("provenance lock poisoned");
        state.read_depth += 1;
        if state.read_depth == 1 {
            state.read_stack.clear();
        }
        if let Some(label) = label {
            if !label.is_empty() {
                state.read_stack.push(label.to_owned());
            }
        }
    }

    /// Exit a read. Returns the finalized chain only when this exit
    /// closes the outermost read of the call tree and at least one label
    /// was collected.
    pub fn end_read(&self) -> Option<LabelChain> {
        let mut state = self.state.lock().expect("provenance lock poisoned");
        if state.read_depth == 0 {
            return None;
        }
        state.read_depth -= 1;
        if state.read_depth != 0 {
            return None;
        }

        // Most-recently-pushed first, de-duplicated keeping the first
        // occurrence: the deepest source ends up at the head.
        let mut raw: LabelChain = SmallVec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for label in state.read_stack.iter().rev() {
            if seen.insert(label.as_str()) {
                raw.push(label.clone());
            }
        }

        let chain = expand_chain(&state.derived_chains, raw);
        state.read_stack.clear();

        if chain.is_empty() {
            state.last_chain = None;
            return None;
        }
        if chain.len() > 1 {
            let terminal = chain.last().expect("chain is non-empty").clone();
            state.derived_chains.insert(terminal, chain.to_vec());
        }
        state.last_chain = Some(chain.clone());
        state.last_read_at = self.clock.now_ms();
        Some(chain)
    }

    /// Consume the finalized chain of the most recent outermost read, if
    /// still within its time-to-live. Take-once: a second call returns
    /// `None` until another read finalizes.
    pub fn take_chain(&self) -> Option<LabelChain> {
        let mut state = self.state.lock().expect("provenance lock poisoned");
        let fresh =
            self.clock.now_ms().saturating_sub(state.last_read_at) <= READ_CHAIN_TTL_MS;
        let chain = state.last_chain.take();
        if fresh {
            chain
        } else {
            None
        }
    }

    /// Render the most recent chain without consuming it, if still fresh.
    pub fn peek_chain(&self) -> Option<String> {
        let state = self.state.lock().expect("provenance lock poisoned");
        if self.clock.now_ms().saturating_sub(state.last_read_at) > READ_CHAIN_TTL_MS {
            return None;
        }
        state.last_chain.as_ref().map(|chain| render_chain(chain))
    }

    /// Attribute a chain to the active source.
    ///
    /// Returns the bare source for an empty chain, the rendered chain
    /// when the source label appears in it, and `None` otherwise;
    /// provenance is never guessed.
    pub fn source_chain(&self, chain: &[String]) -> Option<String> {
        let source = self.active_source()?;
        if chain.is_empty() {
            return Some(source);
        }
        if !chain.iter().any(|label| *label == source) {
            return None;
        }
        Some(render_chain(chain))
    }
}

/// Prepend the cached subchain of the head label, when one is known.
fn expand_chain(cache: &HashMap<String, Vec<String>>, chain: LabelChain) -> LabelChain {
    let Some(head) = chain.first() else {
        return chain;
    };
    let Some(subchain) = cache.get(head) else {
        return chain;
    };
    if subchain.len() < 2 {
        return chain;
    }
    subchain[..subchain.len() - 1]
        .iter()
        .cloned()
        .chain(chain)
        .collect()
}

/// Render a chain as a readable string, collapsing the middle when it
/// exceeds the maximum node count. The terminal node is always kept.
pub fn render_chain(nodes: &[String]) -> String {
    truncate_chain(nodes, CHAIN_MAX_NODES).join(" > ")
}

fn truncate_chain(nodes: &[String], max_nodes: usize) -> Vec<String> {
    if nodes.len() <= max_nodes {
        return nodes.to_vec();
    }
    if max_nodes < 2 {
        return vec![nodes[0].clone(), CHAIN_ELLIPSIS.to_owned()];
    }
    let tail = ((max_nodes - 1) / 2).max(1);
    let head = (max_nodes - tail).max(1);

    let mut out = Vec::with_capacity(head + 1 + tail);
    out.extend(nodes[..head].iter().cloned());
    out.push(CHAIN_ELLIPSIS.to_owned());
    out.extend(nodes[nodes.len() - tail..].iter().cloned());
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn nested_read_builds_source_first_chain() {
        let provenance = ProvenanceBuilder::new(Clock::manual(0));

        provenance.begin_read(Some("double"));
        provenance.begin_read(Some("count"));
        assert!(provenance.end_read().is_none());
        let chain = provenance.end_read().expect("outermost read finalizes");

        assert_eq!(chain.to_vec(), labels(&["count", "double"]));
    }

    #[test]
    fn duplicate_labels_keep_first_occurrence() {
        let provenance = ProvenanceBuilder::new(Clock::manual(0));

        provenance.begin_read(Some("sum"));
        provenance.begin_read(Some("count"));
        provenance.end_read();
        provenance.begin_read(Some("count"));
        provenance.end_read();
        let chain = provenance.end_read().unwrap();

        assert_eq!(chain.to_vec(), labels(&["count", "sum"]));
    }

    #[test]
    fn derived_chain_cache_expands_transitively() {
        let provenance = ProvenanceBuilder::new(Clock::manual(0));

        // First: reading `double` reads `count`.
        provenance.begin_read(Some("double"));
        provenance.begin_read(Some("count"));
        provenance.end_read();
        provenance.end_read();

        // Then: reading `label` reads `double`, and the cached subchain
        // for `double` expands the head.
        provenance.begin_read(Some("label"));
        provenance.begin_read(Some("double"));
        provenance.end_read();
        let chain = provenance.end_read().unwrap();

        assert_eq!(chain.to_vec(), labels(&["count", "double", "label"]));
    }

    #[test]
    fn take_chain_is_take_once_with_ttl() {
        let clock = Clock::manual(1_000);
        let provenance = ProvenanceBuilder::new(clock.clone());

        provenance.begin_read(Some("count"));
        provenance.end_read();

        assert!(provenance.take_chain().is_some());
        assert!(provenance.take_chain().is_none());

        provenance.begin_read(Some("count"));
        provenance.end_read();
        clock.advance(READ_CHAIN_TTL_MS + 1);
        assert!(provenance.take_chain().is_none());
    }

    #[test]
    fn active_source_expires() {
        let clock = Clock::manual(0);
        let provenance = ProvenanceBuilder::new(clock.clone());

        provenance.set_active_source("count");
        assert_eq!(provenance.active_source().as_deref(), Some("count"));

        clock.advance(SOURCE_LABEL_TTL_MS);
        assert!(provenance.active_source().is_none());
    }

    #[test]
    fn source_chain_requires_source_in_chain() {
        let provenance = ProvenanceBuilder::new(Clock::manual(0));
        provenance.set_active_source("count");

        assert_eq!(
            provenance.source_chain(&labels(&["count", "double"])).as_deref(),
            Some("count > double")
        );
        assert!(provenance.source_chain(&labels(&["other"])).is_none());
        assert_eq!(provenance.source_chain(&[]).as_deref(), Some("count"));
    }

    #[test]
    fn long_chains_collapse_but_keep_terminal() {
        let nodes = labels(&["a", "b", "c", "d", "e", "f"]);
        assert_eq!(render_chain(&nodes), "a > b > c > ... > f");

        let short = labels(&["a", "b", "c", "d"]);
        assert_eq!(render_chain(&short), "a > b > c > d");
    }
}
