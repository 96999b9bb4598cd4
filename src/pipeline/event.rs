//! Captured activity.
//!
//! An [`Event`] is immutable once built. Its payload is a tagged union keyed by
//! kind so downstream code pattern-matches instead of probing a loose map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::types::SourceType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// UUID v7, so IDs sort by capture time.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    GitCommit(GitCommit),
    FileChange(FileChange),
    TerminalCmd(TerminalCmd),
}

/// A new HEAD observed in a local repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitCommit {
    /// Repository root on disk.
    pub repo: String,
    pub hash: String,
    pub message: String,
    pub author: String,
    /// `git diff --stat` between the previous and the new HEAD.
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// A debounced write to an interesting source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub filename: String,
    pub ext: String,
    pub size: u64,
    /// Present only for small files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A developer-tool command read from shell history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalCmd {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            payload,
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

impl EventPayload {
    /// Stable kind name, also stored in the `events.type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GitCommit(_) => "git_commit",
            Self::FileChange(_) => "file_change",
            Self::TerminalCmd(_) => "terminal_cmd",
        }
    }

    /// Provenance kind for memories extracted from this payload.
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::GitCommit(_) => SourceType::Git,
            Self::FileChange(_) => SourceType::File,
            Self::TerminalCmd(_) => SourceType::Terminal,
        }
    }

    /// Serialize only the kind-specific body, as stored in `events.data`.
    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            Self::GitCommit(c) => serde_json::to_string(c),
            Self::FileChange(f) => serde_json::to_string(f),
            Self::TerminalCmd(t) => serde_json::to_string(t),
        }
    }

    /// Rebuild a payload from its stored kind and body.
    pub fn from_parts(kind: &str, data: &str) -> serde_json::Result<Self> {
        let data: serde_json::Value = serde_json::from_str(data)?;
        serde_json::from_value(serde_json::json!({ "kind": kind, "data": data }))
    }
}
