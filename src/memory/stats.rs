use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use super::projects::count_projects;
use super::types::MemoryType;
use crate::error::StoreResult;

/// Response from memory_stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_memories: u64,
    /// Every memory type is present, zero when unused.
    pub counts_by_type: BTreeMap<String, u64>,
    pub project_count: u64,
}

/// Compute store-wide counts.
pub fn memory_stats(conn: &Connection) -> StoreResult<StatsResponse> {
    let mut counts_by_type: BTreeMap<String, u64> = MemoryType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();

    let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM memories GROUP BY type")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut total_memories = 0;
    for (memory_type, count) in rows {
        total_memories += count as u64;
        counts_by_type.insert(memory_type, count as u64);
    }

    Ok(StatsResponse {
        total_memories,
        counts_by_type,
        project_count: count_projects(conn)?,
    })
}
