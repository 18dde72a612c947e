//! SQLite-backed metadata store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::MetadataStore;
use crate::db::Database;
use crate::tree::{FileNode, NewNode, NodeId, NodeKind};
use crate::{FallcrateError, Result};

const SELECT_NODES: &str =
    "SELECT id, name, kind, parent_id, size, mime_type, owner_id, created_at FROM nodes";

/// A row of the nodes table.
#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    id: String,
    name: String,
    kind: String,
    parent_id: Option<String>,
    size: Option<i64>,
    mime_type: Option<String>,
    owner_id: String,
    created_at: String,
}

impl TryFrom<NodeRow> for FileNode {
    type Error = FallcrateError;

    fn try_from(row: NodeRow) -> Result<Self> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                FallcrateError::Database(format!("bad timestamp on node {}: {e}", row.id))
            })?;
        Ok(FileNode {
            id: NodeId::from(row.id),
            name: row.name,
            kind: NodeKind::try_from(row.kind)?,
            parent: row.parent_id.map(NodeId::from),
            size: row.size.map(|s| s.max(0) as u64),
            mime_type: row.mime_type,
            created_at,
            owner_id: row.owner_id,
        })
    }
}

/// Metadata store persisting node records in SQLite.
///
/// Every successful mutation reloads the table and pushes it to
/// subscribers.
pub struct SqliteMetadataStore {
    db: Database,
    tx: watch::Sender<Vec<FileNode>>,
}

impl SqliteMetadataStore {
    /// Create a store over an opened database and load the current records.
    pub async fn new(db: Database) -> Result<Self> {
        let (tx, _rx) = watch::channel(Vec::new());
        let store = Self { db, tx };
        store.publish().await?;
        Ok(store)
    }

    /// Get all node records.
    pub async fn list_all(&self) -> Result<Vec<FileNode>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!("{SELECT_NODES} ORDER BY rowid"))
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| FallcrateError::Database(e.to_string()))?;

        rows.into_iter().map(FileNode::try_from).collect()
    }

    /// Get a node record by ID.
    pub async fn get_by_id(&self, id: &NodeId) -> Result<Option<FileNode>> {
        let row = sqlx::query_as::<_, NodeRow>(&format!("{SELECT_NODES} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| FallcrateError::Database(e.to_string()))?;

        row.map(FileNode::try_from).transpose()
    }

    async fn publish(&self) -> Result<()> {
        let nodes = self.list_all().await?;
        debug!(count = nodes.len(), "publishing node collection");
        self.tx.send_replace(nodes);
        Ok(())
    }

    async fn check_parent(&self, parent: Option<&NodeId>) -> Result<()> {
        let Some(parent) = parent else {
            return Ok(());
        };
        match self.get_by_id(parent).await? {
            Some(node) if node.is_directory() => Ok(()),
            Some(_) => Err(FallcrateError::Validation(format!(
                "parent {parent} is not a directory"
            ))),
            None => Err(FallcrateError::NotFound(format!("parent {parent}"))),
        }
    }

    async fn require(&self, id: &NodeId) -> Result<FileNode> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| FallcrateError::NotFound(format!("node {id}")))
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    fn subscribe(&self) -> watch::Receiver<Vec<FileNode>> {
        self.tx.subscribe()
    }

    async fn create_node(&self, node: NewNode) -> Result<FileNode> {
        self.check_parent(node.parent.as_ref()).await?;
        if self.get_by_id(&node.id).await?.is_some() {
            return Err(FallcrateError::Validation(format!(
                "node {} already exists",
                node.id
            )));
        }

        let node = node.into_node();
        sqlx::query(
            "INSERT INTO nodes (id, name, kind, parent_id, size, mime_type, owner_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(node.id.as_str())
        .bind(&node.name)
        .bind(node.kind.as_str())
        .bind(node.parent.as_ref().map(NodeId::as_str))
        .bind(node.size.map(|s| s as i64))
        .bind(&node.mime_type)
        .bind(&node.owner_id)
        .bind(node.created_at.to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| FallcrateError::Database(e.to_string()))?;

        debug!(node = %node.id, name = %node.name, "created node");
        self.publish().await?;
        Ok(node)
    }

    async fn rename_node(&self, id: &NodeId, name: &str) -> Result<FileNode> {
        let result = sqlx::query("UPDATE nodes SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.as_str())
            .execute(self.db.pool())
            .await
            .map_err(|e| FallcrateError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(FallcrateError::NotFound(format!("node {id}")));
        }

        self.publish().await?;
        self.require(id).await
    }

    async fn move_node(&self, id: &NodeId, parent: Option<&NodeId>) -> Result<FileNode> {
        self.check_parent(parent).await?;

        let result = sqlx::query("UPDATE nodes SET parent_id = ? WHERE id = ?")
            .bind(parent.map(NodeId::as_str))
            .bind(id.as_str())
            .execute(self.db.pool())
            .await
            .map_err(|e| FallcrateError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(FallcrateError::NotFound(format!("node {id}")));
        }

        self.publish().await?;
        self.require(id).await
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<Vec<NodeId>> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| FallcrateError::Database(e.to_string()))?;

        let mut deleted = Vec::new();
        for id in ids {
            let result = sqlx::query("DELETE FROM nodes WHERE id = ?")
                .bind(id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| FallcrateError::Database(e.to_string()))?;
            if result.rows_affected() > 0 {
                deleted.push(id.clone());
            }
        }

        tx.commit()
            .await
            .map_err(|e| FallcrateError::Database(e.to_string()))?;

        self.publish().await?;
        Ok(deleted)
    }
}
