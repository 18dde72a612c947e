//! Database schema and migrations for Fallcrate.
//!
//! This module contains all database migrations that will be applied
//! sequentially when the database is first opened or upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Node records
    r#"
-- Files and folders; parent_id is NULL for nodes at the root.
-- parent_id carries no foreign key: integrity is restored by repair.
CREATE TABLE nodes (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,           -- 'file' or 'directory'
    parent_id   TEXT,
    size        INTEGER,                 -- files only
    mime_type   TEXT,                    -- files only
    owner_id    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_nodes_parent_id ON nodes(parent_id);
CREATE INDEX idx_nodes_owner_id ON nodes(owner_id);
"#,
    // v2: Name lookups within a folder
    r#"
CREATE INDEX idx_nodes_parent_name ON nodes(parent_id, name);
"#,
];
