//! MCP `memorypilot_remember` tool parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RememberParams {
    #[schemars(description = "What to remember, in plain language")]
    pub content: String,

    #[schemars(
        description = "Memory type: 'decision', 'pattern', 'fact', 'preference', 'mistake', 'learning'. Defaults to 'fact'."
    )]
    pub r#type: Option<String>,

    #[schemars(description = "Optional topic tags")]
    pub topics: Option<Vec<String>>,
}
