//! Write path and row mapping for the `memories` table.
//!
//! [`create_memory`] persists a fully-built [`Memory`]; the caller supplies the
//! ID and timestamps. Enum and range constraints are enforced by the schema, so
//! a bad record surfaces as [`StoreError::Sqlite`].

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{format_timestamp, parse_timestamp, Memory, Source};
use super::{bytes_to_embedding, embedding_to_bytes};
use crate::error::{StoreError, StoreResult};

/// Column list shared by every query that hydrates a [`Memory`].
pub(crate) const MEMORY_COLUMNS: &str = "id, type, content, summary, scope, project_id, team_id, \
     source_type, source_reference, source_timestamp, confidence, importance, embedding, \
     topics, related_memories, created_at, last_accessed_at, access_count, expires_at";

/// Persist a new memory with all of its fields.
pub fn create_memory(conn: &Connection, memory: &Memory) -> StoreResult<()> {
    let topics = serde_json::to_string(&memory.topics)?;
    let related = serde_json::to_string(&memory.related_memories)?;
    let embedding = memory
        .embedding
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(embedding_to_bytes);

    conn.execute(
        &format!(
            "INSERT INTO memories ({MEMORY_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
        ),
        params![
            memory.id,
            memory.memory_type.as_str(),
            memory.content,
            memory.summary,
            memory.scope.as_str(),
            memory.project_id,
            memory.team_id,
            memory.source.source_type.as_str(),
            memory.source.reference,
            format_timestamp(&memory.source.timestamp),
            memory.confidence,
            memory.importance,
            embedding,
            topics,
            related,
            format_timestamp(&memory.created_at),
            format_timestamp(&memory.last_accessed_at),
            memory.access_count,
            memory.expires_at.as_ref().map(format_timestamp),
        ],
    )?;

    tracing::debug!(id = %memory.id, memory_type = %memory.memory_type, "memory created");
    Ok(())
}

/// Attach (or replace) the embedding vector of an existing memory.
pub fn update_memory_embedding(conn: &Connection, id: &str, embedding: &[f32]) -> StoreResult<()> {
    if embedding.is_empty() {
        return Err(StoreError::InvalidData("empty embedding".into()));
    }
    let rows = conn.execute(
        "UPDATE memories SET embedding = ?1 WHERE id = ?2",
        params![embedding_to_bytes(embedding), id],
    )?;
    if rows == 0 {
        return Err(StoreError::InvalidData(format!("memory not found: {id}")));
    }
    Ok(())
}

/// Fetch one memory by ID without touching its access statistics.
pub fn get_memory(conn: &Connection, id: &str) -> StoreResult<Option<Memory>> {
    let memory = conn
        .query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
            params![id],
            memory_from_row,
        )
        .optional()?;
    Ok(memory)
}

/// Map a row selected with [`MEMORY_COLUMNS`] onto a [`Memory`].
pub(crate) fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get(1)?;
    let scope: String = row.get(4)?;
    let source_type: String = row.get(7)?;
    let embedding: Option<Vec<u8>> = row.get(12)?;
    let topics: String = row.get(13)?;
    let related: String = row.get(14)?;
    let expires_at: Option<String> = row.get(18)?;

    Ok(Memory {
        id: row.get(0)?,
        memory_type: memory_type.parse().map_err(|e: String| conversion(1, e))?,
        content: row.get(2)?,
        summary: row.get(3)?,
        scope: scope.parse().map_err(|e: String| conversion(4, e))?,
        project_id: row.get(5)?,
        team_id: row.get(6)?,
        source: Source {
            source_type: source_type.parse().map_err(|e: String| conversion(7, e))?,
            reference: row.get(8)?,
            timestamp: timestamp_at(row, 9)?,
        },
        confidence: row.get(10)?,
        importance: row.get(11)?,
        embedding: embedding.map(|b| bytes_to_embedding(&b)),
        topics: serde_json::from_str(&topics).map_err(|e| conversion(13, e.to_string()))?,
        related_memories: serde_json::from_str(&related)
            .map_err(|e| conversion(14, e.to_string()))?,
        created_at: timestamp_at(row, 15)?,
        last_accessed_at: timestamp_at(row, 16)?,
        access_count: row.get(17)?,
        expires_at: expires_at
            .map(|s| parse_timestamp(&s).map_err(|e| conversion(18, e.to_string())))
            .transpose()?,
    })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion(idx, e.to_string()))
}

fn conversion(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}
