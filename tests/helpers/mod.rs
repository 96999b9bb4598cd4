#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use memorypilot::db::{self, SharedDb};
use memorypilot::embedding::EmbeddingProvider;
use memorypilot::extraction::{ExtractedMemory, Extractor};
use memorypilot::memory::types::{Memory, MemoryType, Scope, Source, SourceType};
use memorypilot::pipeline::event::{Event, EventPayload, GitCommit, TerminalCmd};
use rusqlite::Connection;
use tokio::sync::mpsc;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::load_sqlite_vec();
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

pub fn shared_test_db() -> SharedDb {
    db::shared(test_db())
}

/// A manual memory with the given importance, last accessed `idle_days` ago.
pub fn memory(memory_type: MemoryType, content: &str, importance: f64, idle_days: i64) -> Memory {
    let at = Utc::now() - Duration::days(idle_days);
    let mut memory = Memory::new(
        memory_type,
        content,
        content,
        Source {
            source_type: SourceType::Manual,
            reference: "test".into(),
            timestamp: at,
        },
        1.0,
    )
    .with_importance(importance);
    memory.created_at = at;
    memory.last_accessed_at = at;
    memory
}

pub fn scoped(memory_type: MemoryType, content: &str, importance: f64, scope: Scope) -> Memory {
    memory(memory_type, content, importance, 0).with_scope(scope)
}

pub fn terminal_event(command: &str) -> Event {
    Event::new(EventPayload::TerminalCmd(TerminalCmd {
        command: command.into(),
        shell: Some("zsh".into()),
    }))
}

pub fn commit_event(repo: &str, hash: &str, message: &str) -> Event {
    Event::new(EventPayload::GitCommit(GitCommit {
        repo: repo.into(),
        hash: hash.into(),
        message: message.into(),
        author: "dev".into(),
        diff: " src/lib.rs | 2 +-".into(),
        files: vec!["src/lib.rs".into()],
        remote: Some("git@example.com:dev/widget.git".into()),
    }))
}

/// Extractor that reports every batch it sees and answers with a fixed list.
pub struct RecordingExtractor {
    batches: mpsc::UnboundedSender<Vec<Event>>,
    answer: Vec<ExtractedMemory>,
}

impl RecordingExtractor {
    pub fn new(answer: Vec<ExtractedMemory>) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<Event>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                batches: tx,
                answer,
            }),
            rx,
        )
    }
}

#[async_trait]
impl Extractor for RecordingExtractor {
    async fn extract(&self, events: &[Event]) -> anyhow::Result<Vec<ExtractedMemory>> {
        let _ = self.batches.send(events.to_vec());
        Ok(self.answer.clone())
    }
}

/// Extractor whose model is always unreachable.
pub struct FailingExtractor;

#[async_trait]
impl Extractor for FailingExtractor {
    async fn extract(&self, _events: &[Event]) -> anyhow::Result<Vec<ExtractedMemory>> {
        anyhow::bail!("connection refused")
    }
}

/// Embedder returning the same vector for every text.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Option<Vec<f32>>> {
        Ok(Some(self.0.clone()))
    }

    fn model(&self) -> &str {
        "fixed"
    }
}

pub fn candidate(memory_type: MemoryType, content: &str, confidence: f64) -> ExtractedMemory {
    ExtractedMemory {
        memory_type,
        content: content.into(),
        summary: content.into(),
        confidence,
        topics: vec![],
    }
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}
