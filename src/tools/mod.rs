pub mod recall;
pub mod remember;
pub mod status;

use recall::RecallParams;
use remember::RememberParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use crate::memory::types::{MemoryType, Scope};
use crate::service::{MemoryService, RecallRequest, RememberRequest};

/// The MemoryPilot MCP tool handler. Every tool delegates to the shared
/// [`MemoryService`].
#[derive(Clone)]
pub struct MemoryPilotTools {
    tool_router: ToolRouter<Self>,
    service: MemoryService,
}

#[tool_router]
impl MemoryPilotTools {
    pub fn new(service: MemoryService) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    /// Search stored memories.
    #[tool(description = "Recall memories about the developer's past decisions, patterns, facts, preferences, mistakes and learnings. Ranked by importance, then recency.")]
    async fn memorypilot_recall(
        &self,
        Parameters(params): Parameters<RecallParams>,
    ) -> Result<String, String> {
        let request = self.recall_request(params)?;
        tracing::info!(query = %request.query, semantic = request.semantic, "memorypilot_recall called");

        let response = self
            .service
            .recall(request)
            .await
            .map_err(|e| format!("{e:#}"))?;

        Ok(recall::format_recall(&response))
    }

    /// Store a manual memory.
    #[tool(description = "Remember something explicitly. Types: decision, pattern, fact (default), preference, mistake, learning.")]
    async fn memorypilot_remember(
        &self,
        Parameters(params): Parameters<RememberParams>,
    ) -> Result<String, String> {
        let memory_type = match &params.r#type {
            Some(t) => t.parse::<MemoryType>().map_err(|e: String| e)?,
            None => MemoryType::Fact,
        };

        let mut request = RememberRequest::new(params.content, "mcp");
        request.memory_type = memory_type;
        request.topics = params.topics.unwrap_or_default();

        let memory = self
            .service
            .remember(request)
            .await
            .map_err(|e| format!("{e:#}"))?;

        Ok(format!("Remembered ({}): {}\nID: {}", memory.memory_type, memory.summary, memory.id))
    }

    /// Report store counts.
    #[tool(description = "Show how many memories are stored, by type, and how many projects are tracked.")]
    async fn memorypilot_status(&self) -> Result<String, String> {
        let stats = self.service.status().await.map_err(|e| format!("{e:#}"))?;
        Ok(status::format_status(&stats))
    }
}

impl MemoryPilotTools {
    fn recall_request(&self, params: RecallParams) -> Result<RecallRequest, String> {
        let types = match &params.r#type {
            Some(t) => vec![t.parse::<MemoryType>()?],
            None => Vec::new(),
        };
        let scopes = match &params.scope {
            Some(s) => vec![s.parse::<Scope>()?],
            None => Vec::new(),
        };
        Ok(RecallRequest {
            query: params.query,
            limit: params.limit.unwrap_or(0),
            types,
            scopes,
            project_id: None,
            semantic: params
                .semantic
                .unwrap_or_else(|| self.service.semantic_available()),
        })
    }
}

#[tool_handler]
impl ServerHandler for MemoryPilotTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "MemoryPilot remembers what the developer has been doing. Use memorypilot_recall \
                 before answering questions about past work, memorypilot_remember to store \
                 something explicitly, and memorypilot_status for counts."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::config::MemoryPilotConfig;
    use crate::db;
    use crate::embedding::{EmbeddingProvider, NullEmbedder};

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Option<Vec<f32>>> {
            Ok(Some(vec![1.0, 0.0, 0.0]))
        }

        fn model(&self) -> &str {
            "unit"
        }
    }

    fn tools(embedder: Arc<dyn EmbeddingProvider>) -> MemoryPilotTools {
        let db = db::shared(db::open_memory_database().unwrap());
        MemoryPilotTools::new(MemoryService::new(
            db,
            embedder,
            Arc::new(MemoryPilotConfig::default()),
        ))
    }

    fn params(query: &str) -> RecallParams {
        RecallParams {
            query: query.into(),
            limit: None,
            r#type: None,
            scope: None,
            semantic: None,
        }
    }

    #[test]
    fn semantic_defaults_to_embedder_availability() {
        let request = tools(Arc::new(UnitEmbedder)).recall_request(params("auth")).unwrap();
        assert!(request.semantic);

        let request = tools(Arc::new(NullEmbedder)).recall_request(params("auth")).unwrap();
        assert!(!request.semantic);
    }

    #[test]
    fn explicit_semantic_flag_wins() {
        let mut p = params("auth");
        p.semantic = Some(false);
        assert!(!tools(Arc::new(UnitEmbedder)).recall_request(p).unwrap().semantic);

        let mut p = params("auth");
        p.semantic = Some(true);
        assert!(tools(Arc::new(NullEmbedder)).recall_request(p).unwrap().semantic);
    }

    #[test]
    fn filters_are_parsed() {
        let mut p = params("");
        p.r#type = Some("decision".into());
        p.scope = Some("project".into());
        p.limit = Some(3);
        let request = tools(Arc::new(NullEmbedder)).recall_request(p).unwrap();
        assert_eq!(request.types, vec![MemoryType::Decision]);
        assert_eq!(request.scopes, vec![Scope::Project]);
        assert_eq!(request.limit, 3);

        let mut p = params("");
        p.r#type = Some("rumor".into());
        assert!(tools(Arc::new(NullEmbedder)).recall_request(p).is_err());
    }

    #[tokio::test]
    async fn recall_tool_uses_similarity_by_default() {
        let t = tools(Arc::new(UnitEmbedder));
        t.service
            .remember(RememberRequest::new("Use PKCE for mobile auth", "mcp"))
            .await
            .unwrap();

        let text = t
            .memorypilot_recall(Parameters(params("pkce")))
            .await
            .unwrap();
        assert!(text.contains("1. [fact] Use PKCE for mobile auth"));
        assert!(!text.contains("search degraded"));
    }
}
