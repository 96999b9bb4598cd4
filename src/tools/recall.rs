//! MCP `memorypilot_recall` tool parameters and rendering.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::service::RecallResponse;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallParams {
    #[schemars(description = "Text to look for in memory content, summary and topics")]
    pub query: String,

    #[schemars(description = "Maximum number of memories to return. Defaults to 5.")]
    pub limit: Option<i64>,

    #[schemars(
        description = "Filter by memory type: 'decision', 'pattern', 'fact', 'preference', 'mistake', 'learning'"
    )]
    pub r#type: Option<String>,

    #[schemars(description = "Filter by scope: 'personal', 'project', 'team', 'org'")]
    pub scope: Option<String>,

    #[schemars(
        description = "Blend embedding similarity into the ranking. Defaults to true when an embedding model is configured."
    )]
    pub semantic: Option<bool>,
}

/// Numbered plain-text listing for assistants.
pub fn format_recall(response: &RecallResponse) -> String {
    if response.memories.is_empty() {
        return "No memories found.".to_string();
    }

    let mut out = format!("Found {} memories:\n", response.memories.len());
    for (i, m) in response.memories.iter().enumerate() {
        out.push_str(&format!("\n{}. [{}] {}\n", i + 1, m.memory_type, m.summary));
        if m.content != m.summary {
            out.push_str(&format!("   {}\n", m.content));
        }
        if !m.topics.is_empty() {
            out.push_str(&format!("   Topics: {}\n", m.topics.join(", ")));
        }
        out.push_str(&format!(
            "   Created: {} | Confidence: {:.0}%\n",
            m.created_at.format("%Y-%m-%d"),
            m.confidence * 100.0
        ));
    }
    if response.degraded {
        out.push_str("\n(search degraded: semantic ranking unavailable)\n");
    }
    out
}
