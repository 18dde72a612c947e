//! Lookup index over one snapshot of the node collection.
//!
//! Built once per pushed snapshot so that closure, ancestry and listing
//! queries don't rescan the flat collection.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::node::{FileNode, NodeId, NodeKind};

/// Index of a node collection by id and by parent.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    nodes: Vec<FileNode>,
    by_id: HashMap<NodeId, usize>,
    children: HashMap<Option<NodeId>, Vec<usize>>,
}

impl TreeIndex {
    /// Build an index over the given nodes.
    pub fn new(nodes: Vec<FileNode>) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut children: HashMap<Option<NodeId>, Vec<usize>> = HashMap::new();

        for (pos, node) in nodes.iter().enumerate() {
            by_id.insert(node.id.clone(), pos);
            children.entry(node.parent.clone()).or_default().push(pos);
        }

        Self {
            nodes,
            by_id,
            children,
        }
    }

    /// All nodes in snapshot order.
    pub fn nodes(&self) -> &[FileNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by ID.
    pub fn get(&self, id: &NodeId) -> Option<&FileNode> {
        self.by_id.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Check if a node exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Direct children of `parent` in snapshot order.
    pub fn children(&self, parent: Option<&NodeId>) -> impl Iterator<Item = &FileNode> + '_ {
        self.children
            .get(&parent.cloned())
            .into_iter()
            .flatten()
            .map(move |&pos| &self.nodes[pos])
    }

    /// Direct children of `parent`, directories first, then by name.
    pub fn sorted_children(&self, parent: Option<&NodeId>) -> Vec<&FileNode> {
        let mut list: Vec<&FileNode> = self.children(parent).collect();
        list.sort_by(|a, b| listing_order(a, b));
        list
    }

    /// All transitive descendants of `id` in pre-order, excluding `id` itself.
    ///
    /// Every directory appears before its own children.
    pub fn descendants(&self, id: &NodeId) -> Vec<&FileNode> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.clone());
        self.collect_descendants(id, &mut visited, &mut out);
        out
    }

    fn collect_descendants<'a>(
        &'a self,
        id: &NodeId,
        visited: &mut HashSet<NodeId>,
        out: &mut Vec<&'a FileNode>,
    ) {
        for child in self.children(Some(id)) {
            if !visited.insert(child.id.clone()) {
                continue;
            }
            out.push(child);
            if child.kind == NodeKind::Directory {
                self.collect_descendants(&child.id, visited, out);
            }
        }
    }

    /// The node itself followed by all of its descendants in pre-order.
    ///
    /// Empty if the node does not exist.
    pub fn closure(&self, id: &NodeId) -> Vec<&FileNode> {
        let Some(root) = self.get(id) else {
            return Vec::new();
        };
        let mut out = vec![root];
        out.extend(self.descendants(id));
        out
    }

    /// Union of the closures of every id, each node listed once.
    ///
    /// Order follows the input ids, so overlapping selections keep the
    /// first occurrence.
    pub fn union_closure<'a, I>(&self, ids: I) -> Vec<&FileNode>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            for node in self.closure(id) {
                if seen.insert(node.id.clone()) {
                    out.push(node);
                }
            }
        }
        out
    }

    /// Path from the root down to `id`, inclusive.
    ///
    /// Empty for the root itself or an unknown id. Stops early if the
    /// chain loops.
    pub fn path(&self, id: Option<&NodeId>) -> Vec<&FileNode> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = id.and_then(|id| self.get(id));

        while let Some(node) = current {
            if !seen.insert(node.id.clone()) {
                break;
            }
            path.push(node);
            current = node.parent.as_ref().and_then(|p| self.get(p));
        }

        path.reverse();
        path
    }

    /// Nodes whose name contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&FileNode> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<&FileNode> = self
            .nodes
            .iter()
            .filter(|n| n.name.to_lowercase().contains(&needle))
            .collect();
        hits.sort_by(|a, b| listing_order(a, b));
        hits
    }

    /// Total size of all files in bytes.
    pub fn total_size(&self) -> u64 {
        self.nodes.iter().filter_map(|n| n.size).sum()
    }
}

/// Directories before files, then by name ignoring case.
pub fn listing_order(a: &FileNode, b: &FileNode) -> Ordering {
    match (a.kind, b.kind) {
        (NodeKind::Directory, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Directory) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    }
}
