//! Database Migrations
//!
//! Schema migration definitions for the storage layer. Applied in order on
//! the writer connection at startup; each migration runs at most once.

use rusqlite::Connection;

use crate::error::Result;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, vectors, waypoints, temporal graph, coactivation queue",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Coactivation retry scheduling: next_attempt_at + status index",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
-- Memory rows (HSG unit). Sector/tag/metadata columns hold JSON; all
-- timestamps are epoch milliseconds.
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    content TEXT NOT NULL,
    primary_sector TEXT NOT NULL,
    sectors TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    salience REAL NOT NULL DEFAULT 0.5,
    created_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_sector ON memories(primary_sector);
CREATE INDEX IF NOT EXISTS idx_memories_last_seen ON memories(last_seen_at);

-- Vector rows: one per (memory, sector); little-endian f32 blob.
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT NOT NULL,
    sector TEXT NOT NULL,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    v BLOB NOT NULL,
    dim INTEGER NOT NULL,
    PRIMARY KEY (id, sector)
);

CREATE INDEX IF NOT EXISTS idx_vectors_sector_user ON vectors(sector, user_id);

-- Waypoints: centroid-summarized clusters, one sector each.
CREATE TABLE IF NOT EXISTS waypoints (
    id TEXT PRIMARY KEY,
    sector TEXT NOT NULL,
    mean_v BLOB NOT NULL,
    member_ids TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_waypoints_sector ON waypoints(sector);

-- Undirected waypoint edges, stored with a < b.
CREATE TABLE IF NOT EXISTS waypoint_edges (
    a TEXT NOT NULL,
    b TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 0,
    last_activated_at INTEGER NOT NULL,
    PRIMARY KEY (a, b)
);

-- Temporal facts with validity windows; valid_to NULL means open.
CREATE TABLE IF NOT EXISTS temporal_facts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    valid_from INTEGER NOT NULL,
    valid_to INTEGER,
    confidence REAL NOT NULL DEFAULT 1.0,
    last_updated INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_facts_subject ON temporal_facts(subject);
CREATE INDEX IF NOT EXISTS idx_facts_object ON temporal_facts(object);
CREATE INDEX IF NOT EXISTS idx_facts_predicate_from ON temporal_facts(predicate, valid_from);
CREATE INDEX IF NOT EXISTS idx_facts_user ON temporal_facts(user_id);

-- Typed relations between facts.
CREATE TABLE IF NOT EXISTS temporal_edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    valid_from INTEGER,
    valid_to INTEGER,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    PRIMARY KEY (source_id, target_id, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_temporal_edges_source ON temporal_edges(source_id);
CREATE INDEX IF NOT EXISTS idx_temporal_edges_target ON temporal_edges(target_id);

-- Durable coactivation queue: one row per completed query.
CREATE TABLE IF NOT EXISTS coactivation_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    payload TEXT NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    enqueued_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at)
VALUES (1, CAST(strftime('%s', 'now') AS INTEGER) * 1000);
"#;

/// V2: retry scheduling for the coactivation worker
const MIGRATION_V2_UP: &str = r#"
ALTER TABLE coactivation_jobs ADD COLUMN next_attempt_at INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_jobs_status_attempt
    ON coactivation_jobs(status, next_attempt_at);

UPDATE schema_version
SET version = 2, applied_at = CAST(strftime('%s', 'now') AS INTEGER) * 1000;
"#;

/// Apply all pending migrations to a connection.
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    // The version table may not exist yet on a fresh database.
    let current: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .ok()
        .flatten()
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
