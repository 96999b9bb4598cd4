//! Event-to-memory extraction gateway.
//!
//! An [`Extractor`] turns a non-empty batch of events into zero or more
//! [`ExtractedMemory`] candidates. An empty list is a normal answer. The
//! dispatcher decides which candidates to keep; the gateway does not filter.

pub mod ollama;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::memory::types::{truncate_chars, MemoryType};
use crate::pipeline::event::{Event, EventPayload};

/// Files listed per commit in the prompt.
const MAX_PROMPT_FILES: usize = 5;
const MAX_PROMPT_DIFF_CHARS: usize = 500;
const MAX_PROMPT_CONTENT_CHARS: usize = 300;
const FALLBACK_SUMMARY_CHARS: usize = 100;

/// A candidate memory proposed by the model. Never stored directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMemory {
    pub memory_type: MemoryType,
    pub content: String,
    pub summary: String,
    pub confidence: f64,
    pub topics: Vec<String>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Propose memories for a batch. `events` is never empty.
    async fn extract(&self, events: &[Event]) -> Result<Vec<ExtractedMemory>>;
}

/// Extractor used when no model is configured. Never proposes anything.
pub struct NullExtractor;

#[async_trait]
impl Extractor for NullExtractor {
    async fn extract(&self, _events: &[Event]) -> Result<Vec<ExtractedMemory>> {
        Ok(Vec::new())
    }
}

/// Create an extractor from config.
///
/// Supported providers: `"ollama"` and `"none"`.
pub fn create_extractor(config: &crate::config::ExtractionConfig) -> Result<Arc<dyn Extractor>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(ollama::OllamaExtractor::new(config)?)),
        "none" => Ok(Arc::new(NullExtractor)),
        other => anyhow::bail!("unknown extraction provider: {other}. Supported: ollama, none"),
    }
}

// ── Prompt formatting ────────────────────────────────────────────────────────

/// Render a batch as numbered plain-text blocks, in arrival order.
pub fn format_events(events: &[Event]) -> String {
    let mut out = String::new();
    for (i, event) in events.iter().enumerate() {
        out.push_str(&format!(
            "Event {} [{}] at {}:\n",
            i + 1,
            event.kind(),
            event.timestamp.format("%Y-%m-%d %H:%M")
        ));

        match &event.payload {
            EventPayload::GitCommit(commit) => {
                out.push_str(&format!("  Commit: {}\n", commit.message));
                if !commit.files.is_empty() {
                    let shown: Vec<&str> = commit
                        .files
                        .iter()
                        .take(MAX_PROMPT_FILES)
                        .map(String::as_str)
                        .collect();
                    out.push_str(&format!("  Files: {}\n", shown.join(", ")));
                }
                if !commit.diff.is_empty() {
                    out.push_str(&format!(
                        "  Diff summary: {}\n",
                        truncate_chars(&commit.diff, MAX_PROMPT_DIFF_CHARS)
                    ));
                }
            }
            EventPayload::FileChange(file) => {
                out.push_str(&format!("  File: {}\n", file.path));
                if let Some(content) = file.content.as_deref().filter(|c| !c.is_empty()) {
                    out.push_str(&format!(
                        "  Content preview: {}\n",
                        truncate_chars(content, MAX_PROMPT_CONTENT_CHARS)
                    ));
                }
            }
            EventPayload::TerminalCmd(cmd) => {
                out.push_str(&format!("  Command: {}\n", cmd.command));
            }
        }

        out.push('\n');
    }
    out
}

/// Full instruction text sent to the model for one batch.
pub fn build_prompt(events: &[Event]) -> String {
    format!(
        "You extract long-lived memories from a software developer's activity.\n\
         Read the events below and decide what is worth remembering.\n\
         \n\
         Each memory has:\n\
         - type: decision, pattern, fact, preference, mistake or learning\n\
         - content: one to three specific sentences\n\
         - summary: under 80 characters\n\
         - confidence: 0.0 to 1.0, how sure you are it is worth keeping\n\
         - topics: two to five keywords\n\
         \n\
         Guidelines:\n\
         - Keep only what would help an AI assistant later.\n\
         - Prefer decisions, patterns, lessons and preferences; skip routine or boilerplate changes.\n\
         - Say why a decision was made when the events show it.\n\
         - Zero to three memories per batch. Returning none is fine.\n\
         \n\
         Events:\n\
         {}\n\
         Answer with JSON only, no markdown:\n\
         {{\"memories\": [{{\"type\": \"decision\", \"content\": \"...\", \"summary\": \"...\", \
         \"confidence\": 0.85, \"topics\": [\"topic1\", \"topic2\"]}}]}}\n\
         If nothing is worth keeping answer {{\"memories\": []}}",
        format_events(events)
    )
}

// ── Response parsing ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    memories: Vec<RawMemory>,
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(rename = "type", default)]
    memory_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    topics: Vec<String>,
}

/// Parse the model's answer.
///
/// Markdown code fences around the JSON are tolerated. Malformed JSON is an
/// error. Individual entries with an unknown type or no content are dropped.
pub fn parse_extraction_response(text: &str) -> Result<Vec<ExtractedMemory>> {
    let cleaned = strip_code_fence(text);
    let raw: RawResponse = serde_json::from_str(cleaned)
        .with_context(|| format!("malformed extraction response: {}", truncate_chars(cleaned, 200)))?;

    let mut out = Vec::with_capacity(raw.memories.len());
    for m in raw.memories {
        let memory_type = match m.memory_type.trim().to_ascii_lowercase().parse::<MemoryType>() {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(error = %e, "dropping extracted memory");
                continue;
            }
        };
        let content = m.content.trim().to_string();
        if content.is_empty() {
            continue;
        }
        let summary = match m.summary.trim() {
            "" => truncate_chars(&content, FALLBACK_SUMMARY_CHARS),
            s => s.to_string(),
        };
        out.push(ExtractedMemory {
            memory_type,
            content,
            summary,
            confidence: m.confidence,
            topics: m.topics,
        });
    }
    Ok(out)
}

fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    s = s.strip_prefix("```json").unwrap_or(s);
    s = s.strip_prefix("```").unwrap_or(s);
    s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::{FileChange, GitCommit, TerminalCmd};

    fn commit_with(files: usize, diff_len: usize) -> Event {
        Event::new(EventPayload::GitCommit(GitCommit {
            repo: "/src/widget".into(),
            hash: "abc123".into(),
            message: "Use PKCE for the mobile login flow".into(),
            author: "dev".into(),
            diff: "x".repeat(diff_len),
            files: (0..files).map(|i| format!("src/f{i}.rs")).collect(),
            remote: None,
        }))
    }

    #[test]
    fn commit_formatting_caps_files_and_diff() {
        let text = format_events(&[commit_with(8, 2000)]);
        assert!(text.starts_with("Event 1 [git_commit] at "));
        assert!(text.contains("Commit: Use PKCE for the mobile login flow"));
        assert!(text.contains("src/f4.rs"));
        assert!(!text.contains("src/f5.rs"));
        let diff_line = text.lines().find(|l| l.contains("Diff summary")).unwrap();
        assert!(diff_line.ends_with("..."));
        assert!(diff_line.len() < 540);
    }

    #[test]
    fn events_are_numbered_in_arrival_order() {
        let file = Event::new(EventPayload::FileChange(FileChange {
            path: "/src/widget/Cargo.toml".into(),
            filename: "Cargo.toml".into(),
            ext: "toml".into(),
            size: 900,
            content: Some("é".repeat(400)),
        }));
        let cmd = Event::new(EventPayload::TerminalCmd(TerminalCmd {
            command: "cargo clippy".into(),
            shell: None,
        }));
        let text = format_events(&[file, cmd]);
        let first = text.find("Event 1 [file_change]").unwrap();
        let second = text.find("Event 2 [terminal_cmd]").unwrap();
        assert!(first < second);
        assert!(text.contains("Command: cargo clippy"));
        let preview = text.lines().find(|l| l.contains("Content preview")).unwrap();
        assert_eq!(preview.chars().filter(|c| *c == 'é').count(), 297);
    }

    #[test]
    fn prompt_embeds_events() {
        let prompt = build_prompt(&[commit_with(1, 10)]);
        assert!(prompt.contains("Event 1 [git_commit]"));
        assert!(prompt.contains("{\"memories\": []}"));
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let body = r#"{"memories": [{"type": "decision", "content": "Use PKCE", "summary": "PKCE", "confidence": 0.9, "topics": ["auth"]}]}"#;
        let plain = parse_extraction_response(body).unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].memory_type, MemoryType::Decision);
        assert_eq!(plain[0].topics, vec!["auth"]);

        let fenced = parse_extraction_response(&format!("```json\n{body}\n```")).unwrap();
        assert_eq!(fenced, plain);
    }

    #[test]
    fn empty_answer_is_not_an_error() {
        assert!(parse_extraction_response(r#"{"memories": []}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_answer_is_an_error() {
        assert!(parse_extraction_response("I think you should use PKCE").is_err());
        assert!(parse_extraction_response(r#"{"memories": [{"type": "decision""#).is_err());
    }

    #[test]
    fn bad_entries_are_dropped_individually() {
        let body = r#"{"memories": [
            {"type": "insight", "content": "unknown type", "confidence": 0.9},
            {"type": "Fact", "content": "   ", "confidence": 0.9},
            {"type": "MISTAKE", "content": "Forgot to run migrations before deploy", "confidence": 0.7}
        ]}"#;
        let parsed = parse_extraction_response(body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].memory_type, MemoryType::Mistake);
        assert_eq!(parsed[0].summary, "Forgot to run migrations before deploy");
        assert!(parsed[0].topics.is_empty());
    }

    #[tokio::test]
    async fn null_extractor_extracts_nothing() {
        let out = NullExtractor.extract(&[commit_with(1, 1)]).await.unwrap();
        assert!(out.is_empty());
    }
}
