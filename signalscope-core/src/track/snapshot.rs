//! Downstream Snapshot Engine
//!
//! Classifies which reactions reachable from a mutated cell actually
//! re-ran. Two passes frame the mutation:
//!
//! 1. **Capture**: before delegating to the real mutation, walk the
//!    cell's dependents breadth-first (derived reactions expand through
//!    their own dependents, effects are leaves) and record each reachable
//!    node's kind, labels, and write-version. A visited set tolerates
//!    diamond dependencies.
//!
//! 2. **Finalize**: after the mutation returns, re-read the same nodes'
//!    versions. A node is `updated` iff both versions are known and
//!    differ.
//!
//! The traversal holds only weak references; a reaction dropped inside
//! the snapshot window finalizes with an unknown after-version instead of
//! aborting. The dependency structure is assumed to be a DAG: cyclic
//! input is reported as a configuration error rather than classified,
//! because before/after comparison is not meaningful on a cycle.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};

use crate::error::TrackerError;
use crate::reactive::{NodeId, ReactionKind, ReactionNode, SignalCell};

use super::events::DownstreamRecord;

/// One reachable reaction captured before the mutation was delegated.
pub struct DownstreamCapture {
    node: Weak<ReactionNode>,
    kind: ReactionKind,
    label: Option<String>,
    fn_name: Option<String>,
    component_name: Option<String>,
    write_version_before: u64,
}

/// Capture the dependency subgraph reachable from `cell`.
///
/// Returns an error when the subgraph contains a cycle; the caller is
/// expected to log it and proceed with an empty downstream list.
pub fn capture(cell: &SignalCell) -> Result<Vec<DownstreamCapture>, TrackerError> {
    let roots = cell.reactions();
    if roots.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(label) = find_cycle(&roots) {
        return Err(TrackerError::CyclicDependencies { label });
    }

    let mut queue: VecDeque<Arc<ReactionNode>> = roots.into();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut records = Vec::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.id()) {
            continue;
        }
        records.push(DownstreamCapture {
            node: Arc::downgrade(&node),
            kind: node.kind(),
            label: node.label().map(str::to_owned),
            fn_name: node.fn_name().map(str::to_owned),
            component_name: node.component_name().map(str::to_owned),
            write_version_before: node.write_version(),
        });
        if node.kind() == ReactionKind::Derived {
            queue.extend(node.reactions());
        }
    }

    Ok(records)
}

/// Re-read versions after the mutation and classify each captured node.
pub fn finalize(captures: Vec<DownstreamCapture>) -> Vec<DownstreamRecord> {
    captures
        .into_iter()
        .map(|capture| {
            let write_version_after = capture.node.upgrade().map(|node| node.write_version());
            DownstreamRecord {
                kind: capture.kind,
                label: capture.label,
                fn_name: capture.fn_name,
                component_name: capture.component_name,
                write_version_before: Some(capture.write_version_before),
                write_version_after,
                updated: write_version_after
                    .is_some_and(|after| after != capture.write_version_before),
            }
        })
        .collect()
}

fn children_of(node: &Arc<ReactionNode>) -> Vec<Arc<ReactionNode>> {
    if node.kind() == ReactionKind::Derived {
        node.reactions()
    } else {
        Vec::new()
    }
}

/// Depth-first search for a node reachable from itself. Returns the label
/// of the first node found on a cycle.
fn find_cycle(roots: &[Arc<ReactionNode>]) -> Option<String> {
    let mut done: HashSet<NodeId> = HashSet::new();

    for root in roots {
        if done.contains(&root.id()) {
            continue;
        }
        let mut on_path: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(Arc<ReactionNode>, Vec<Arc<ReactionNode>>, usize)> = Vec::new();
        on_path.insert(root.id());
        let children = children_of(root);
        stack.push((Arc::clone(root), children, 0));

        while !stack.is_empty() {
            let top = stack.len() - 1;
            let next_child = {
                let (_, children, index) = &mut stack[top];
                if *index < children.len() {
                    let child = Arc::clone(&children[*index]);
                    *index += 1;
                    Some(child)
                } else {
                    None
                }
            };

            match next_child {
                Some(child) => {
                    if on_path.contains(&child.id()) {
                        return Some(child.label().unwrap_or("<unlabeled>").to_owned());
                    }
                    if !done.contains(&child.id()) {
                        on_path.insert(child.id());
                        let grandchildren = children_of(&child);
                        stack.push((child, grandchildren, 0));
                    }
                }
                None => {
                    let (node, _, _) = stack.pop().expect("stack is non-empty");
                    on_path.remove(&node.id());
                    done.insert(node.id());
                }
            }
        }
    }
    None
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
