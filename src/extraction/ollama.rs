//! Ollama extraction provider: `POST {endpoint}/api/generate` in JSON mode.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{build_prompt, parse_extraction_response, ExtractedMemory, Extractor};
use crate::config::ExtractionConfig;
use crate::pipeline::event::Event;

pub struct OllamaExtractor {
    client: Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build extraction HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Extractor for OllamaExtractor {
    async fn extract(&self, events: &[Event]) -> Result<Vec<ExtractedMemory>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(events),
            stream: false,
            format: "json",
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("extraction model not reachable at {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("extraction model returned {status}: {body}");
        }

        let generated: GenerateResponse = resp
            .json()
            .await
            .context("failed to decode generate response")?;

        parse_extraction_response(&generated.response)
    }
}
