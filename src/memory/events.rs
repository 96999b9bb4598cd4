//! Append-only event log.
//!
//! Events are written once on dequeue and afterwards only gain a
//! `processed_at` marker. Rows with no marker are the recovery backlog.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::types::{format_timestamp, parse_timestamp};
use crate::error::StoreResult;
use crate::pipeline::event::{Event, EventPayload};

pub fn create_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO events (id, type, timestamp, data, project_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id,
            event.kind(),
            format_timestamp(&event.timestamp),
            event.payload.data_json()?,
            event.project_id,
        ],
    )?;
    Ok(())
}

/// Stamp one event as processed. Already-processed events keep their first stamp.
pub fn mark_event_processed(conn: &Connection, id: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE events SET processed_at = ?1 WHERE id = ?2 AND processed_at IS NULL",
        params![format_timestamp(&Utc::now()), id],
    )?;
    Ok(())
}

/// Stamp a whole batch in one transaction.
pub fn mark_events_processed(conn: &mut Connection, ids: &[String]) -> StoreResult<()> {
    let tx = conn.transaction()?;
    for id in ids {
        mark_event_processed(&tx, id)?;
    }
    tx.commit()?;
    Ok(())
}

/// Oldest-first events that never got a processed marker.
pub fn unprocessed_events(conn: &Connection, limit: usize) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, type, timestamp, data, project_id FROM events \
         WHERE processed_at IS NULL ORDER BY timestamp ASC, id ASC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], read_event_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id.clone();
        match row.into_event() {
            Ok(event) => events.push(event),
            Err(e) => {
                // An unreadable row would block recovery forever; retire it.
                tracing::warn!(id = %id, error = %e, "skipping malformed event");
                mark_event_processed(conn, &id)?;
            }
        }
    }
    Ok(events)
}

pub fn count_unprocessed(conn: &Connection) -> StoreResult<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE processed_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

struct EventRow {
    id: String,
    kind: String,
    timestamp: String,
    data: String,
    project_id: Option<String>,
}

impl EventRow {
    fn into_event(self) -> StoreResult<Event> {
        let payload = EventPayload::from_parts(&self.kind, &self.data)?;
        let timestamp = parse_timestamp(&self.timestamp)?;
        Ok(Event {
            id: self.id,
            timestamp,
            payload,
            project_id: self.project_id,
        })
    }
}

fn read_event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        timestamp: row.get(2)?,
        data: row.get(3)?,
        project_id: row.get(4)?,
    })
}
