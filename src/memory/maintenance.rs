use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use super::types::format_timestamp;
use crate::error::StoreResult;

// ── Importance feedback constants ────────────────────────────────────────────

/// Multiplier applied to every memory returned by a recall, capped at 1.0.
pub const ACCESS_BOOST: f64 = 1.05;

/// Multiplier applied to stale memories on each decay pass.
pub const DECAY_FACTOR: f64 = 0.99;

/// Memories at or below this importance no longer decay.
pub const DECAY_FLOOR: f64 = 0.1;

/// A memory must be idle for longer than this to decay.
pub fn staleness_window() -> Duration {
    Duration::days(1)
}

// ── Importance Decay ─────────────────────────────────────────────────────────

/// Decay the importance of every memory that is above the floor and has not
/// been accessed within the staleness window. Returns the number of rows changed.
pub fn decay_importance(conn: &Connection) -> StoreResult<usize> {
    decay_importance_at(conn, Utc::now())
}

/// [`decay_importance`] evaluated against an explicit clock.
pub fn decay_importance_at(conn: &Connection, now: DateTime<Utc>) -> StoreResult<usize> {
    let cutoff = format_timestamp(&(now - staleness_window()));
    let affected = conn.execute(
        "UPDATE memories SET importance = importance * ?1 \
         WHERE importance > ?2 AND last_accessed_at < ?3",
        params![DECAY_FACTOR, DECAY_FLOOR, cutoff],
    )?;

    tracing::info!(affected, cutoff = %cutoff, "importance decay applied");
    Ok(affected)
}
