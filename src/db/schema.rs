//! SQL DDL for all MemoryPilot tables.
//!
//! Defines `projects`, `memories`, `events` and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Tracked repository roots
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT UNIQUE NOT NULL,
    git_remote TEXT,
    created_at TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

-- Core memory storage
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK(type IN ('decision','pattern','fact','preference','mistake','learning')),
    content TEXT NOT NULL,
    summary TEXT NOT NULL,
    scope TEXT NOT NULL DEFAULT 'personal' CHECK(scope IN ('personal','project','team','org')),
    project_id TEXT REFERENCES projects(id),
    team_id TEXT,
    source_type TEXT NOT NULL,
    source_reference TEXT NOT NULL DEFAULT '',
    source_timestamp TEXT NOT NULL,
    confidence REAL NOT NULL CHECK(confidence >= 0.0 AND confidence <= 1.0),
    importance REAL NOT NULL DEFAULT 1.0 CHECK(importance >= 0.0 AND importance <= 1.0),
    embedding BLOB,
    topics TEXT NOT NULL DEFAULT '[]',
    related_memories TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_id);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(scope);
CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance DESC);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC);

-- Append-only captured activity
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    data TEXT NOT NULL,
    project_id TEXT REFERENCES projects(id),
    processed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_unprocessed ON events(processed_at, timestamp);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [super::migrations::CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
