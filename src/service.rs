//! Recall, remember and status.
//!
//! [`MemoryService`] is the one surface shared by the command line and the MCP
//! tools. It owns a handle on the store and the embedding gateway; gateway
//! trouble only ever shows up as a `degraded` flag.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MemoryPilotConfig;
use crate::db::{self, with_db, SharedDb};
use crate::embedding::{attach_embedding, create_provider, EmbeddingProvider};
use crate::memory::search::{hybrid_recall, recall, RecallFilter};
use crate::memory::stats::{memory_stats, StatsResponse};
use crate::memory::store::create_memory;
use crate::memory::types::{truncate_chars, Memory, MemoryType, Scope, Source, SourceType};

/// Manual summaries are the content cut to this many characters.
pub const SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct RecallRequest {
    pub query: String,
    /// Zero or negative selects the configured default.
    pub limit: i64,
    pub types: Vec<MemoryType>,
    pub scopes: Vec<Scope>,
    pub project_id: Option<String>,
    /// Blend in vector similarity when the query can be embedded.
    pub semantic: bool,
}

/// One recalled memory as shown to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallItem {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub summary: String,
    pub content: String,
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub confidence: f64,
    pub importance: f64,
    pub source: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RecallItem {
    fn from_memory(memory: Memory, score: Option<f64>) -> Self {
        Self {
            id: memory.id,
            memory_type: memory.memory_type,
            summary: memory.summary,
            content: memory.content,
            topics: memory.topics,
            created_at: memory.created_at,
            confidence: memory.confidence,
            importance: memory.importance,
            source: memory.source.source_type,
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResponse {
    pub memories: Vec<RecallItem>,
    /// Semantic search was asked for but no query embedding was available.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct RememberRequest {
    pub content: String,
    pub memory_type: MemoryType,
    pub topics: Vec<String>,
    /// Which surface created it: `"cli"` or `"mcp"`.
    pub reference: String,
}

impl RememberRequest {
    pub fn new(content: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            memory_type: MemoryType::Fact,
            topics: Vec::new(),
            reference: reference.into(),
        }
    }
}

#[derive(Clone)]
pub struct MemoryService {
    db: SharedDb,
    embedder: Arc<dyn EmbeddingProvider>,
    config: Arc<MemoryPilotConfig>,
}

impl MemoryService {
    pub fn new(
        db: SharedDb,
        embedder: Arc<dyn EmbeddingProvider>,
        config: Arc<MemoryPilotConfig>,
    ) -> Self {
        Self {
            db,
            embedder,
            config,
        }
    }

    /// Open the configured store, which must already exist.
    pub fn open(config: MemoryPilotConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_existing(&db_path)?;
        let embedder = create_provider(&config.embedding)?;
        check_embedding_model(&conn, embedder.as_ref());
        Ok(Self::new(db::shared(conn), embedder, Arc::new(config)))
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    /// Whether an embedding provider is configured. Callers use this as the
    /// default for [`RecallRequest::semantic`].
    pub fn semantic_available(&self) -> bool {
        self.embedder.model() != "none"
    }

    pub async fn recall(&self, request: RecallRequest) -> Result<RecallResponse> {
        let limit = if request.limit > 0 {
            request.limit
        } else {
            self.config.retrieval.default_limit as i64
        };
        let filter = RecallFilter {
            scopes: request.scopes,
            types: request.types,
            project_id: request.project_id,
        };
        let query = request.query;

        let query_embedding = if request.semantic {
            match self.embedder.embed(&query).await {
                Ok(Some(v)) if !v.is_empty() => Some(v),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "query embedding failed, falling back to keyword recall");
                    None
                }
            }
        } else {
            None
        };
        let degraded = request.semantic && query_embedding.is_none();

        let memories = match query_embedding {
            Some(embedding) => {
                let weights = self.config.retrieval.weights();
                with_db(&self.db, move |conn| {
                    hybrid_recall(conn, &query, &embedding, &filter, limit, &weights)
                })
                .await
                .context("recall failed")?
                .into_iter()
                .map(|s| RecallItem::from_memory(s.memory, Some(s.score)))
                .collect()
            }
            None => with_db(&self.db, move |conn| recall(conn, &query, &filter, limit))
                .await
                .context("recall failed")?
                .into_iter()
                .map(|m| RecallItem::from_memory(m, None))
                .collect(),
        };

        Ok(RecallResponse { memories, degraded })
    }

    /// Store a manual memory: confidence 1.0, personal scope, manual source.
    pub async fn remember(&self, request: RememberRequest) -> Result<Memory> {
        let content = request.content.trim().to_string();
        anyhow::ensure!(!content.is_empty(), "content must not be empty");

        let memory = Memory::new(
            request.memory_type,
            content.clone(),
            truncate_chars(&content, SUMMARY_CHARS),
            Source {
                source_type: SourceType::Manual,
                reference: request.reference,
                timestamp: Utc::now(),
            },
            1.0,
        )
        .with_scope(Scope::Personal)
        .with_topics(request.topics);

        let to_store = memory.clone();
        with_db(&self.db, move |conn| create_memory(conn, &to_store))
            .await
            .context("failed to store memory")?;
        tracing::info!(id = %memory.id, memory_type = %memory.memory_type, "memory remembered");

        attach_embedding(&self.db, self.embedder.as_ref(), &memory.id, &memory.content).await;
        Ok(memory)
    }

    pub async fn status(&self) -> Result<StatsResponse> {
        with_db(&self.db, |conn| memory_stats(conn))
            .await
            .context("failed to read status")
    }
}

/// Warn when stored vectors were produced by a different model, and record
/// the model on first use.
pub fn check_embedding_model(conn: &rusqlite::Connection, embedder: &dyn EmbeddingProvider) {
    if embedder.model() == "none" {
        return;
    }
    match db::migrations::get_embedding_model(conn) {
        Ok(Some(stored)) if stored != embedder.model() => tracing::warn!(
            stored = %stored,
            configured = %embedder.model(),
            "embedding model changed, older vectors will not match new queries"
        ),
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = db::migrations::set_embedding_model(conn, embedder.model()) {
                tracing::warn!(error = %e, "failed to record embedding model");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to read embedding model"),
    }
}
