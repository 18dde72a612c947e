//! Invariant repair for pushed snapshots.
//!
//! A remote writer can leave the collection with self-parented nodes,
//! dangling parents or parent cycles. `repair` relocates every offender to
//! the root and reports the moves that make the fix persistent. Nothing is
//! ever deleted.

use std::collections::HashMap;

use tracing::warn;

use super::node::{FileNode, NodeId, NodeKind};

/// Why a node was relocated to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairReason {
    /// The node named itself as parent.
    SelfParent,
    /// The parent does not exist or is not a directory.
    Orphan,
    /// The node is part of a parent cycle.
    Cycle,
}

/// A move to the root that the metadata store must be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectiveMove {
    /// The relocated node.
    pub id: NodeId,
    /// The parent it had before repair.
    pub previous_parent: Option<NodeId>,
    /// Which pass relocated it.
    pub reason: RepairReason,
}

/// Result of a repair pass.
#[derive(Debug, Clone, Default)]
pub struct Repaired {
    /// The collection with every invariant restored.
    pub nodes: Vec<FileNode>,
    /// One entry per relocated node.
    pub patches: Vec<CorrectiveMove>,
}

impl Repaired {
    /// Check if the input already satisfied every invariant.
    pub fn is_clean(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Restore acyclicity and referential integrity.
///
/// Runs the self-parent, orphan and cycle passes in that order. Idempotent:
/// a valid collection comes back unchanged with no patches.
pub fn repair(mut nodes: Vec<FileNode>) -> Repaired {
    let mut patches = Vec::new();

    for node in nodes.iter_mut() {
        if node.parent.as_ref() == Some(&node.id) {
            relocate(node, RepairReason::SelfParent, &mut patches);
        }
    }

    let kinds: HashMap<NodeId, NodeKind> =
        nodes.iter().map(|n| (n.id.clone(), n.kind)).collect();
    for node in nodes.iter_mut() {
        let Some(parent) = &node.parent else {
            continue;
        };
        if kinds.get(parent) != Some(&NodeKind::Directory) {
            relocate(node, RepairReason::Orphan, &mut patches);
        }
    }

    let positions: HashMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(pos, n)| (n.id.clone(), pos))
        .collect();
    let bound = nodes.len();
    for start in 0..nodes.len() {
        let Some(cycle) = find_cycle(&nodes, &positions, start, bound) else {
            continue;
        };
        for pos in cycle {
            relocate(&mut nodes[pos], RepairReason::Cycle, &mut patches);
        }
    }

    Repaired { nodes, patches }
}

/// Walk parent links from `start`; if the walk comes back to `start`
/// before reaching the root, return every position on the loop.
fn find_cycle(
    nodes: &[FileNode],
    positions: &HashMap<NodeId, usize>,
    start: usize,
    bound: usize,
) -> Option<Vec<usize>> {
    let mut branch = vec![start];
    let mut current = nodes[start].parent.as_ref();

    for _ in 0..bound {
        let pos = *positions.get(current?)?;
        if pos == start {
            return Some(branch);
        }
        branch.push(pos);
        current = nodes[pos].parent.as_ref();
    }

    None
}

fn relocate(node: &mut FileNode, reason: RepairReason, patches: &mut Vec<CorrectiveMove>) {
    let previous_parent = node.parent.take();
    warn!(
        node = %node.id,
        name = %node.name,
        previous_parent = ?previous_parent,
        ?reason,
        "relocating node to root"
    );
    patches.push(CorrectiveMove {
        id: node.id.clone(),
        previous_parent,
        reason,
    });
}
