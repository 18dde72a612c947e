//! Node types for the Fallcrate tree.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FallcrateError, Result};

/// Opaque, immutable identifier of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Allocate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key of the blob holding this node's content.
    pub fn blob_key(&self) -> String {
        format!("uploads/{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether a node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
        }
    }
}

impl TryFrom<String> for NodeKind {
    type Error = FallcrateError;

    fn try_from(s: String) -> Result<Self> {
        match s.as_str() {
            "file" => Ok(NodeKind::File),
            "directory" => Ok(NodeKind::Directory),
            other => Err(FallcrateError::Validation(format!(
                "unknown node kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file or directory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    /// Unique node ID.
    pub id: NodeId,
    /// Display name, unique among siblings.
    pub name: String,
    /// File or directory.
    pub kind: NodeKind,
    /// Parent directory (None for root).
    pub parent: Option<NodeId>,
    /// Content size in bytes (files only).
    pub size: Option<u64>,
    /// Content mime type (files only).
    pub mime_type: Option<String>,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// Owner of the node.
    pub owner_id: String,
}

impl FileNode {
    /// Check if this node is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Check if this node sits directly under `parent`.
    pub fn is_child_of(&self, parent: Option<&NodeId>) -> bool {
        self.parent.as_ref() == parent
    }
}

/// Data for creating a new node.
///
/// Ids are allocated by the caller so that whole subtrees can be planned
/// before anything is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    /// Node ID to create the record under.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// File or directory.
    pub kind: NodeKind,
    /// Parent directory (None for root).
    pub parent: Option<NodeId>,
    /// Content size in bytes (files only).
    pub size: Option<u64>,
    /// Content mime type (files only).
    pub mime_type: Option<String>,
    /// Owner of the node.
    pub owner_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewNode {
    /// Create a new directory record with a fresh id.
    pub fn directory(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            kind: NodeKind::Directory,
            parent: None,
            size: None,
            mime_type: None,
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a new file record with a fresh id.
    pub fn file(
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            kind: NodeKind::File,
            parent: None,
            size: Some(size),
            mime_type: Some(mime_type.into()),
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Use a specific id instead of the generated one.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Set the parent directory.
    pub fn with_parent(mut self, parent: Option<NodeId>) -> Self {
        self.parent = parent;
        self
    }

    /// Clone an existing node under a new id and name.
    pub fn cloned_from(node: &FileNode, id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: node.kind,
            parent: node.parent.clone(),
            size: node.size,
            mime_type: node.mime_type.clone(),
            owner_id: node.owner_id.clone(),
            created_at: Utc::now(),
        }
    }

    /// Turn the request into the record a store would hold.
    pub fn into_node(self) -> FileNode {
        let (size, mime_type) = match self.kind {
            NodeKind::File => (self.size, self.mime_type),
            NodeKind::Directory => (None, None),
        };
        FileNode {
            id: self.id,
            name: self.name,
            kind: self.kind,
            parent: self.parent,
            size,
            mime_type,
            created_at: self.created_at,
            owner_id: self.owner_id,
        }
    }
}
