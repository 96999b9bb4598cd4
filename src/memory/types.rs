//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the six kinds of remembered fact), [`Scope`]
//! (visibility tier), [`Source`] (provenance), [`Memory`] (a full record) and
//! [`Project`] (a tracked repository root).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Category of a remembered fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A choice that was made, ideally with its reason.
    Decision,
    /// A recurring way of doing things.
    Pattern,
    /// Plain knowledge about the codebase or environment.
    Fact,
    /// How the developer likes things done.
    Preference,
    /// Something that went wrong and should not be repeated.
    Mistake,
    /// A lesson picked up along the way.
    Learning,
}

impl MemoryType {
    pub const ALL: [MemoryType; 6] = [
        Self::Decision,
        Self::Pattern,
        Self::Fact,
        Self::Preference,
        Self::Mistake,
        Self::Learning,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Pattern => "pattern",
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Mistake => "mistake",
            Self::Learning => "learning",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(Self::Decision),
            "pattern" => Ok(Self::Pattern),
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "mistake" => Ok(Self::Mistake),
            "learning" => Ok(Self::Learning),
            _ => Err(format!(
                "unknown memory type: {s} (expected decision|pattern|fact|preference|mistake|learning)"
            )),
        }
    }
}

/// Visibility tier of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Personal,
    Project,
    Team,
    Org,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Project => "project",
            Self::Team => "team",
            Self::Org => "org",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "project" => Ok(Self::Project),
            "team" => Ok(Self::Team),
            "org" => Ok(Self::Org),
            _ => Err(format!("unknown scope: {s} (expected personal|project|team|org)")),
        }
    }
}

/// Where a memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Git,
    File,
    Terminal,
    Chat,
    Manual,
    Import,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::File => "file",
            Self::Terminal => "terminal",
            Self::Chat => "chat",
            Self::Manual => "manual",
            Self::Import => "import",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(Self::Git),
            "file" => Ok(Self::File),
            "terminal" => Ok(Self::Terminal),
            "chat" => Ok(Self::Chat),
            "manual" => Ok(Self::Manual),
            "import" => Ok(Self::Import),
            _ => Err(format!("unknown source type: {s}")),
        }
    }
}

/// Provenance of a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Commit hash, file path, `"cli"`, `"batch"`, ...
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    /// Short one-line version of `content`.
    pub summary: String,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub source: Source,
    /// Extraction-time certainty in `[0.0, 1.0]`. Never changes after creation.
    pub confidence: f64,
    /// Ranking weight in `[0.0, 1.0]`. Boosted on recall, decayed when idle.
    pub importance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub topics: Vec<String>,
    pub related_memories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u32,
    /// Advisory only; nothing in the core deletes expired memories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Memory {
    /// Build a fresh memory with importance 1.0 and an unused access history.
    ///
    /// `confidence` is clamped to `[0.0, 1.0]`.
    pub fn new(
        memory_type: MemoryType,
        content: impl Into<String>,
        summary: impl Into<String>,
        source: Source,
        confidence: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            memory_type,
            content: content.into(),
            summary: summary.into(),
            scope: Scope::default(),
            project_id: None,
            team_id: None,
            source,
            confidence: clamp_unit(confidence),
            importance: 1.0,
            embedding: None,
            topics: Vec::new(),
            related_memories: Vec::new(),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: None,
        }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }
}

/// A tracked repository root, identified by its filesystem path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_remote: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Project {
    /// New project rooted at `path`, named after its last path component.
    pub fn from_path(path: impl Into<String>, git_remote: Option<String>) -> Self {
        let path = path.into();
        let name = std::path::Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name,
            path,
            git_remote,
            created_at: now,
            last_seen: now,
        }
    }
}

/// Clamp a score into `[0.0, 1.0]`.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Canonical storage format: RFC 3339, UTC, millisecond precision, `Z` suffix.
///
/// Fixed width, so lexical order in SQL equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad timestamp {s:?}: {e}")))
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
