use anyhow::Result;

use crate::config::MemoryPilotConfig;
use crate::memory::types::{MemoryType, Scope};
use crate::service::{MemoryService, RecallRequest};
use crate::tools::recall::format_recall;

pub struct RecallArgs {
    pub query: String,
    pub limit: i64,
    pub memory_type: Option<MemoryType>,
    pub scopes: Vec<Scope>,
    pub no_semantic: bool,
    pub json: bool,
}

impl RecallArgs {
    /// Similarity ranking is on whenever an embedder is configured, unless
    /// `--no-semantic` was given.
    fn to_request(&self, service: &MemoryService) -> RecallRequest {
        RecallRequest {
            query: self.query.clone(),
            limit: self.limit,
            types: self.memory_type.into_iter().collect(),
            scopes: self.scopes.clone(),
            project_id: None,
            semantic: !self.no_semantic && service.semantic_available(),
        }
    }
}

/// Recall memories from the terminal.
pub async fn recall(config: MemoryPilotConfig, args: RecallArgs) -> Result<()> {
    let service = MemoryService::open(config)?;
    let response = service.recall(args.to_request(&service)).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", format_recall(&response));
    }
    Ok(())
}
