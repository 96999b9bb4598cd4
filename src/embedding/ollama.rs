//! Ollama embedding provider.
//!
//! Calls `POST {endpoint}/api/embeddings` with `{model, prompt}` and reads
//! `{embedding: [f64]}` back.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f64>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/api/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let resp = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .with_context(|| format!("embedding service not reachable at {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("embedding service returned {status}: {body}");
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .context("failed to parse embedding response")?;

        if parsed.embedding.is_empty() {
            return Ok(None);
        }
        Ok(Some(parsed.embedding.into_iter().map(|v| v as f32).collect()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
