//! Ranked recall over the `memories` table.
//!
//! [`recall`] orders by importance, then recency of access. [`hybrid_recall`]
//! additionally blends in cosine similarity against a query embedding, computed
//! in SQL with sqlite-vec. Both apply the access boost to every memory they
//! return, and both return the post-boost state.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;

use super::embedding_to_bytes;
use super::maintenance::ACCESS_BOOST;
use super::store::{memory_from_row, MEMORY_COLUMNS};
use super::types::{format_timestamp, parse_timestamp, Memory, MemoryType, Scope};
use crate::error::StoreResult;

/// Limit used when the caller passes zero or a negative value.
pub const DEFAULT_RECALL_LIMIT: usize = 5;

/// Days over which the recency component of hybrid scoring falls to 1/e.
const RECENCY_HALF_SCALE_DAYS: f64 = 30.0;

// ── Public types ──────────────────────────────────────────────────────────────

/// Structural filters. Empty lists mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct RecallFilter {
    pub scopes: Vec<Scope>,
    pub types: Vec<MemoryType>,
    /// Matches memories of this project and memories with no project.
    pub project_id: Option<String>,
}

/// Blend weights for [`hybrid_recall`].
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub similarity: f64,
    pub importance: f64,
    pub recency: f64,
    /// Candidates below this similarity need a keyword match to be returned.
    pub min_similarity: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            similarity: 0.6,
            importance: 0.3,
            recency: 0.1,
            min_similarity: 0.3,
        }
    }
}

/// A memory returned by [`hybrid_recall`] with its ranking inputs.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Cosine similarity to the query, when the memory has a comparable embedding.
    pub similarity: Option<f64>,
    pub score: f64,
}

/// Resolve a caller-supplied limit.
pub fn effective_limit(limit: i64) -> usize {
    if limit <= 0 {
        DEFAULT_RECALL_LIMIT
    } else {
        limit as usize
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Keyword/importance recall.
///
/// A non-empty `query` must appear (ASCII case-insensitive) in the content, the
/// summary or the serialized topic list. Results are ordered by importance
/// descending, then last access descending.
pub fn recall(
    conn: &mut Connection,
    query: &str,
    filter: &RecallFilter,
    limit: i64,
) -> StoreResult<Vec<Memory>> {
    let mut args = Vec::new();
    let mut clauses = structural_clauses(filter, &mut args);
    let query = query.trim();
    if !query.is_empty() {
        clauses.push(keyword_expr(query, &mut args));
    }
    args.push(Value::Integer(effective_limit(limit) as i64));

    let tx = conn.transaction()?;
    let mut memories = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories{} \
             ORDER BY importance DESC, last_accessed_at DESC, id DESC LIMIT ?",
            where_sql(&clauses)
        ))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), memory_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    boost_access(&tx, memories.iter_mut())?;
    tx.commit()?;

    tracing::debug!(query, returned = memories.len(), "recall");
    Ok(memories)
}

/// Similarity-blended recall.
///
/// Candidates must pass the structural filter and either reach
/// `weights.min_similarity` or match `query` as a keyword. A memory without an
/// embedding of the query's dimension counts as similarity 0.
pub fn hybrid_recall(
    conn: &mut Connection,
    query: &str,
    query_embedding: &[f32],
    filter: &RecallFilter,
    limit: i64,
    weights: &HybridWeights,
) -> StoreResult<Vec<ScoredMemory>> {
    let query = query.trim();
    let mut args = vec![
        Value::Integer((query_embedding.len() * 4) as i64),
        Value::Blob(embedding_to_bytes(query_embedding)),
    ];
    let keyword = if query.is_empty() {
        "1".to_string()
    } else {
        keyword_expr(query, &mut args)
    };
    let clauses = structural_clauses(filter, &mut args);

    let sql = format!(
        "SELECT {MEMORY_COLUMNS}, \
         CASE WHEN embedding IS NOT NULL AND length(embedding) = ? \
              THEN 1.0 - vec_distance_cosine(embedding, ?) END, \
         {keyword} \
         FROM memories{}",
        where_sql(&clauses)
    );

    let now = Utc::now();
    let tx = conn.transaction()?;
    let candidates = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                let memory = memory_from_row(row)?;
                let similarity: Option<f64> = row.get(19)?;
                let keyword_hit: bool = row.get(20)?;
                Ok((memory, similarity, keyword_hit))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut scored: Vec<ScoredMemory> = candidates
        .into_iter()
        .filter(|(_, sim, keyword_hit)| {
            *keyword_hit || sim.is_some_and(|s| s >= weights.min_similarity)
        })
        .map(|(memory, similarity, _)| {
            let score = weights.similarity * similarity.unwrap_or(0.0)
                + weights.importance * memory.importance
                + weights.recency * recency(&memory.last_accessed_at, &now);
            ScoredMemory {
                memory,
                similarity,
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.memory.importance.total_cmp(&a.memory.importance))
            .then(b.memory.last_accessed_at.cmp(&a.memory.last_accessed_at))
    });
    scored.truncate(effective_limit(limit));

    boost_access(&tx, scored.iter_mut().map(|s| &mut s.memory))?;
    tx.commit()?;

    tracing::debug!(query, returned = scored.len(), "hybrid recall");
    Ok(scored)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn structural_clauses(filter: &RecallFilter, args: &mut Vec<Value>) -> Vec<String> {
    let mut clauses = Vec::new();

    if !filter.scopes.is_empty() {
        clauses.push(format!("scope IN ({})", placeholders(filter.scopes.len())));
        args.extend(filter.scopes.iter().map(|s| Value::Text(s.as_str().into())));
    }
    if !filter.types.is_empty() {
        clauses.push(format!("type IN ({})", placeholders(filter.types.len())));
        args.extend(filter.types.iter().map(|t| Value::Text(t.as_str().into())));
    }
    if let Some(project_id) = &filter.project_id {
        clauses.push("(project_id = ? OR project_id IS NULL)".to_string());
        args.push(Value::Text(project_id.clone()));
    }

    clauses
}

/// Substring test over content, summary and topics. Pushes three bind values.
fn keyword_expr(query: &str, args: &mut Vec<Value>) -> String {
    let pattern = format!("%{}%", escape_like(query));
    for _ in 0..3 {
        args.push(Value::Text(pattern.clone()));
    }
    "(content LIKE ? ESCAPE '\\' OR summary LIKE ? ESCAPE '\\' OR topics LIKE ? ESCAPE '\\')"
        .to_string()
}

/// Escape LIKE metacharacters so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn recency(last_accessed: &DateTime<Utc>, now: &DateTime<Utc>) -> f64 {
    let days = (*now - *last_accessed).num_milliseconds().max(0) as f64 / 86_400_000.0;
    (-days / RECENCY_HALF_SCALE_DAYS).exp()
}

/// Apply the access boost to the given memories, both in the store and in place.
fn boost_access<'a>(
    tx: &Transaction<'_>,
    memories: impl Iterator<Item = &'a mut Memory>,
) -> StoreResult<()> {
    let stamp = format_timestamp(&Utc::now());
    let now = parse_timestamp(&stamp)?;
    let mut stmt = tx.prepare(
        "UPDATE memories SET importance = MIN(1.0, importance * ?1), \
         access_count = access_count + 1, last_accessed_at = ?2 WHERE id = ?3",
    )?;
    for memory in memories {
        stmt.execute(params![ACCESS_BOOST, stamp, memory.id])?;
        memory.importance = (memory.importance * ACCESS_BOOST).min(1.0);
        memory.access_count += 1;
        memory.last_accessed_at = now;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{create_memory, get_memory, update_memory_embedding};
    use crate::memory::types::{Source, SourceType};

    fn insert(
        conn: &Connection,
        content: &str,
        memory_type: MemoryType,
        scope: Scope,
        importance: f64,
    ) -> String {
        let m = Memory::new(
            memory_type,
            content,
            content,
            Source {
                source_type: SourceType::Manual,
                reference: "cli".into(),
                timestamp: Utc::now(),
            },
            1.0,
        )
        .with_scope(scope)
        .with_importance(importance);
        create_memory(conn, &m).unwrap();
        m.id
    }

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn limit_defaults_when_not_positive() {
        assert_eq!(effective_limit(0), DEFAULT_RECALL_LIMIT);
        assert_eq!(effective_limit(-3), DEFAULT_RECALL_LIMIT);
        assert_eq!(effective_limit(12), 12);
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }

    #[test]
    fn recall_orders_by_importance_then_recency() {
        let mut conn = db::open_memory_database().unwrap();
        let low = insert(&conn, "low", MemoryType::Fact, Scope::Personal, 0.2);
        let high = insert(&conn, "high", MemoryType::Fact, Scope::Personal, 0.9);
        let mid = insert(&conn, "mid", MemoryType::Fact, Scope::Personal, 0.5);

        let ids: Vec<String> = recall(&mut conn, "", &RecallFilter::default(), 0)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![high, mid, low]);
    }

    #[test]
    fn keyword_match_is_case_insensitive_and_covers_topics() {
        let mut conn = db::open_memory_database().unwrap();
        let m = Memory::new(
            MemoryType::Decision,
            "Tokens rotate hourly",
            "rotation",
            Source {
                source_type: SourceType::Manual,
                reference: "cli".into(),
                timestamp: Utc::now(),
            },
            1.0,
        )
        .with_topics(vec!["OAuth".into()]);
        create_memory(&conn, &m).unwrap();
        insert(&conn, "unrelated", MemoryType::Fact, Scope::Personal, 1.0);

        let by_content = recall(&mut conn, "TOKENS", &RecallFilter::default(), 5).unwrap();
        assert_eq!(by_content.len(), 1);
        let by_topic = recall(&mut conn, "oauth", &RecallFilter::default(), 5).unwrap();
        assert_eq!(by_topic.len(), 1);
        assert_eq!(by_topic[0].id, m.id);
        assert!(recall(&mut conn, "50%", &RecallFilter::default(), 5).unwrap().is_empty());
    }

    #[test]
    fn recall_boosts_and_returns_post_access_state() {
        let mut conn = db::open_memory_database().unwrap();
        let id = insert(&conn, "boost me", MemoryType::Fact, Scope::Personal, 0.5);

        let results = recall(&mut conn, "boost", &RecallFilter::default(), 5).unwrap();
        assert_eq!(results[0].access_count, 1);
        assert!((results[0].importance - 0.525).abs() < 1e-9);

        let stored = get_memory(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.access_count, 1);
        assert!((stored.importance - 0.525).abs() < 1e-9);
        assert_eq!(stored.last_accessed_at, results[0].last_accessed_at);
    }

    #[test]
    fn boost_never_exceeds_ceiling() {
        let mut conn = db::open_memory_database().unwrap();
        let id = insert(&conn, "popular", MemoryType::Fact, Scope::Personal, 0.9);

        let mut previous = 0.9;
        for _ in 0..10 {
            let m = recall(&mut conn, "popular", &RecallFilter::default(), 1).unwrap();
            assert!(m[0].importance >= previous);
            assert!(m[0].importance <= 1.0);
            previous = m[0].importance;
        }
        assert_eq!(get_memory(&conn, &id).unwrap().unwrap().importance, 1.0);
    }

    #[test]
    fn project_filter_includes_unowned_memories() {
        let mut conn = db::open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, path, created_at, last_seen) \
             VALUES ('p1', 'one', '/one', 't', 't'), ('p2', 'two', '/two', 't', 't')",
            [],
        )
        .unwrap();
        let source = Source {
            source_type: SourceType::Git,
            reference: "abc".into(),
            timestamp: Utc::now(),
        };
        let mine = Memory::new(MemoryType::Fact, "mine", "mine", source.clone(), 1.0)
            .with_project(Some("p1".into()));
        let theirs = Memory::new(MemoryType::Fact, "theirs", "theirs", source.clone(), 1.0)
            .with_project(Some("p2".into()));
        let global = Memory::new(MemoryType::Fact, "global", "global", source, 1.0);
        for m in [&mine, &theirs, &global] {
            create_memory(&conn, m).unwrap();
        }

        let filter = RecallFilter {
            project_id: Some("p1".into()),
            ..Default::default()
        };
        let mut ids: Vec<String> = recall(&mut conn, "", &filter, 10)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        let mut expected = vec![mine.id, global.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn hybrid_ranks_similar_memory_first() {
        let mut conn = db::open_memory_database().unwrap();
        let near = insert(&conn, "database pooling", MemoryType::Fact, Scope::Personal, 0.5);
        let far = insert(&conn, "css layout", MemoryType::Fact, Scope::Personal, 0.9);
        update_memory_embedding(&conn, &near, &unit(8, 0)).unwrap();
        update_memory_embedding(&conn, &far, &unit(8, 1)).unwrap();

        let results = hybrid_recall(
            &mut conn,
            "connections",
            &unit(8, 0),
            &RecallFilter::default(),
            5,
            &HybridWeights::default(),
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, near);
        assert!((results[0].similarity.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(results[0].memory.access_count, 1);
    }

    #[test]
    fn hybrid_keeps_keyword_matches_without_embeddings() {
        let mut conn = db::open_memory_database().unwrap();
        let plain = insert(&conn, "retry with backoff", MemoryType::Pattern, Scope::Personal, 0.7);
        let other_dim = insert(&conn, "retry budget", MemoryType::Pattern, Scope::Personal, 0.6);
        update_memory_embedding(&conn, &other_dim, &unit(4, 0)).unwrap();

        let results = hybrid_recall(
            &mut conn,
            "retry",
            &unit(8, 0),
            &RecallFilter::default(),
            5,
            &HybridWeights::default(),
        )
        .unwrap();

        let ids: Vec<&str> = results.iter().map(|s| s.memory.id.as_str()).collect();
        assert_eq!(ids, vec![plain.as_str(), other_dim.as_str()]);
        assert!(results.iter().all(|s| s.similarity.is_none()));
    }

    #[test]
    fn hybrid_similarity_never_overrides_type_filter() {
        let mut conn = db::open_memory_database().unwrap();
        let fact = insert(&conn, "exact match", MemoryType::Fact, Scope::Personal, 1.0);
        update_memory_embedding(&conn, &fact, &unit(8, 0)).unwrap();

        let filter = RecallFilter {
            types: vec![MemoryType::Decision],
            ..Default::default()
        };
        let results = hybrid_recall(
            &mut conn,
            "exact",
            &unit(8, 0),
            &filter,
            5,
            &HybridWeights::default(),
        )
        .unwrap();
        assert!(results.is_empty());
    }
}
