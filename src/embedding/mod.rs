//! Text-to-vector embedding gateway.
//!
//! Provides the [`EmbeddingProvider`] trait, a no-op [`NullEmbedder`] and an
//! Ollama-backed [`ollama::OllamaEmbedder`]. The provider is selected once via
//! [`create_provider`] from configuration.
//!
//! `Ok(None)` means "no embedding available" and is not an error. Callers treat
//! `Err` the same way after logging it.

pub mod ollama;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::db::{with_db, SharedDb};
use crate::memory::store::update_memory_embedding;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    /// Model identifier recorded alongside stored vectors.
    fn model(&self) -> &str;
}

/// Provider used when embeddings are disabled. Always answers `Ok(None)`.
pub struct NullEmbedder;

#[async_trait]
impl EmbeddingProvider for NullEmbedder {
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }

    fn model(&self) -> &str {
        "none"
    }
}

/// Create an embedding provider from config.
///
/// Supported providers: `"ollama"` and `"none"`.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(ollama::OllamaEmbedder::new(config)?)),
        "none" => Ok(Arc::new(NullEmbedder)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: ollama, none"),
    }
}

/// Embed `text` and store the vector on memory `memory_id`.
///
/// Returns whether a vector was stored. Gateway and storage failures are
/// logged, never propagated.
pub async fn attach_embedding(
    db: &SharedDb,
    provider: &dyn EmbeddingProvider,
    memory_id: &str,
    text: &str,
) -> bool {
    let vector = match provider.embed(text).await {
        Ok(Some(v)) if !v.is_empty() => v,
        Ok(_) => return false,
        Err(e) => {
            tracing::warn!(id = %memory_id, error = %e, "embedding failed, storing memory without vector");
            return false;
        }
    };

    let id = memory_id.to_string();
    match with_db(db, move |conn| update_memory_embedding(conn, &id, &vector)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(id = %memory_id, error = %e, "failed to store embedding");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    #[tokio::test]
    async fn null_embedder_reports_unavailable() {
        let config = EmbeddingConfig {
            provider: "none".into(),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.embed("anything").await.unwrap(), None);
        assert_eq!(provider.model(), "none");
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
            Ok(Some(self.0.clone()))
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
            anyhow::bail!("connection refused")
        }

        fn model(&self) -> &str {
            "broken"
        }
    }

    async fn stored_memory(db: &SharedDb) -> String {
        use crate::memory::store::create_memory;
        use crate::memory::types::{Memory, MemoryType, Source, SourceType};

        let memory = Memory::new(
            MemoryType::Fact,
            "Postgres runs on port 5433 locally",
            "Postgres port",
            Source {
                source_type: SourceType::Manual,
                reference: "cli".into(),
                timestamp: chrono::Utc::now(),
            },
            1.0,
        );
        let id = memory.id.clone();
        with_db(db, move |conn| create_memory(conn, &memory)).await.unwrap();
        id
    }

    #[tokio::test]
    async fn attach_embedding_stores_vector() {
        let db = crate::db::shared(crate::db::open_memory_database().unwrap());
        let id = stored_memory(&db).await;

        assert!(attach_embedding(&db, &FixedEmbedder(vec![0.1, 0.2]), &id, "text").await);

        let lookup = id.clone();
        let loaded = with_db(&db, move |conn| crate::memory::store::get_memory(conn, &lookup))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.embedding, Some(vec![0.1, 0.2]));
    }

    #[tokio::test]
    async fn attach_embedding_degrades_quietly() {
        let db = crate::db::shared(crate::db::open_memory_database().unwrap());
        let id = stored_memory(&db).await;

        assert!(!attach_embedding(&db, &BrokenEmbedder, &id, "text").await);
        assert!(!attach_embedding(&db, &NullEmbedder, &id, "text").await);
        assert!(!attach_embedding(&db, &FixedEmbedder(vec![1.0]), "missing-id", "text").await);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
