//! Batcher/dispatcher worker.
//!
//! Consumes the event queue, persists each event as soon as it is dequeued and
//! groups events into batches. A batch is flushed when it reaches
//! `batch_size` or when `batch_wait` has elapsed since the previous flush,
//! whichever comes first. Flushes run inline, so at most one batch is ever in
//! flight. Every event of a flushed batch is marked processed afterwards,
//! whatever the extraction outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::event::{Event, EventPayload};
use super::queue::EventQueue;
use crate::config::MemoryPilotConfig;
use crate::db::{with_db, SharedDb};
use crate::embedding::{attach_embedding, EmbeddingProvider};
use crate::extraction::{ExtractedMemory, Extractor};
use crate::memory::events::{create_event, mark_events_processed, unprocessed_events};
use crate::memory::projects::project_for_event;
use crate::memory::store::create_memory;
use crate::memory::types::{Memory, Source, SourceType};

/// Candidates below this confidence are discarded.
pub const ACCEPT_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub extraction_timeout: Duration,
    /// Unprocessed events replayed before the live queue; 0 disables recovery.
    pub recovery_limit: usize,
}

impl DispatcherConfig {
    pub fn from_config(config: &MemoryPilotConfig) -> Self {
        Self {
            batch_size: config.pipeline.batch_size.max(1),
            batch_wait: config.pipeline.batch_wait(),
            extraction_timeout: config.extraction.timeout(),
            recovery_limit: config.pipeline.recovery_limit,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_config(&MemoryPilotConfig::default())
    }
}

/// What one flush did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub events: usize,
    pub candidates: usize,
    pub accepted: usize,
    pub created: usize,
    /// True when the gateway failed or timed out.
    pub extraction_failed: bool,
}

pub struct Dispatcher {
    db: SharedDb,
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        db: SharedDb,
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            embedder,
            config,
        }
    }

    pub fn spawn(self, queue: EventQueue, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(queue, shutdown))
    }

    /// Worker loop. Returns after the shutdown flush, or once every sink is
    /// gone and the queue is drained.
    pub async fn run(self, mut queue: EventQueue, shutdown: CancellationToken) {
        self.recover(&shutdown).await;

        let batch_size = self.config.batch_size.max(1);
        let wait = self.config.batch_wait;
        let mut batch: Vec<Event> = Vec::with_capacity(batch_size);
        let timer = tokio::time::sleep(wait);
        tokio::pin!(timer);

        tracing::info!(batch_size, batch_wait_ms = wait.as_millis() as u64, "dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if !batch.is_empty() {
                        tracing::info!(pending = batch.len(), "flushing partial batch on shutdown");
                        self.process_batch(std::mem::take(&mut batch)).await;
                    }
                    break;
                }
                received = queue.recv() => match received {
                    Some(event) => {
                        batch.push(self.persist(event).await);
                        if batch.len() >= batch_size {
                            self.process_batch(std::mem::take(&mut batch)).await;
                            timer.as_mut().reset(Instant::now() + wait);
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            self.process_batch(std::mem::take(&mut batch)).await;
                        }
                        break;
                    }
                },
                _ = &mut timer => {
                    if !batch.is_empty() {
                        self.process_batch(std::mem::take(&mut batch)).await;
                    }
                    timer.as_mut().reset(Instant::now() + wait);
                }
            }
        }

        tracing::info!(dropped = queue.dropped(), "dispatcher stopped");
    }

    /// Extract, store accepted memories, then mark every event processed.
    pub async fn process_batch(&self, events: Vec<Event>) -> BatchReport {
        let mut report = BatchReport {
            events: events.len(),
            ..Default::default()
        };
        if events.is_empty() {
            return report;
        }
        tracing::info!(events = events.len(), "processing batch");

        let candidates =
            match tokio::time::timeout(self.config.extraction_timeout, self.extractor.extract(&events))
                .await
            {
                Ok(Ok(candidates)) => candidates,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "extraction failed, batch yields no memories");
                    report.extraction_failed = true;
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = self.config.extraction_timeout.as_secs(),
                        "extraction timed out, batch yields no memories"
                    );
                    report.extraction_failed = true;
                    Vec::new()
                }
            };
        report.candidates = candidates.len();

        let accepted: Vec<ExtractedMemory> = candidates
            .into_iter()
            .filter(|c| c.confidence >= ACCEPT_CONFIDENCE)
            .collect();
        report.accepted = accepted.len();

        let provenance = BatchProvenance::of(&events);
        for candidate in accepted {
            let memory = provenance.memory_from(candidate);
            let to_store = memory.clone();
            match with_db(&self.db, move |conn| create_memory(conn, &to_store)).await {
                Ok(()) => {
                    report.created += 1;
                    attach_embedding(&self.db, self.embedder.as_ref(), &memory.id, &memory.content)
                        .await;
                }
                Err(e) => tracing::error!(error = %e, "failed to store extracted memory"),
            }
        }

        let ids: Vec<String> = events.into_iter().map(|e| e.id).collect();
        if let Err(e) = with_db(&self.db, move |conn| mark_events_processed(conn, &ids)).await {
            tracing::error!(error = %e, "failed to mark batch processed");
        }

        tracing::info!(
            events = report.events,
            candidates = report.candidates,
            created = report.created,
            "batch processed"
        );
        report
    }

    /// Write the event to the log, resolving its project first. A storage
    /// failure is logged and the event still goes into the batch.
    async fn persist(&self, event: Event) -> Event {
        let mut stored = event.clone();
        let result = with_db(&self.db, move |conn| {
            stored.project_id = project_for_event(conn, &stored)?;
            create_event(conn, &stored)?;
            Ok(stored)
        })
        .await;

        match result {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(id = %event.id, error = %e, "failed to persist event");
                event
            }
        }
    }

    /// Replay events left unprocessed by an earlier run, oldest first.
    async fn recover(&self, shutdown: &CancellationToken) {
        let limit = self.config.recovery_limit;
        if limit == 0 {
            return;
        }
        let pending = match with_db(&self.db, move |conn| unprocessed_events(conn, limit)).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "failed to load unprocessed events");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        tracing::info!(count = pending.len(), "recovering unprocessed events");
        for chunk in pending.chunks(self.config.batch_size.max(1)) {
            if shutdown.is_cancelled() {
                break;
            }
            self.process_batch(chunk.to_vec()).await;
        }
    }
}

/// Provenance shared by every memory extracted from one batch.
struct BatchProvenance {
    source_type: SourceType,
    reference: String,
    project_id: Option<String>,
}

impl BatchProvenance {
    fn of(events: &[Event]) -> Self {
        let source_type = events
            .first()
            .map(|e| e.payload.source_type())
            .unwrap_or(SourceType::Import);

        let reference = events
            .iter()
            .rev()
            .find_map(|e| match &e.payload {
                EventPayload::GitCommit(c) => Some(c.hash.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "batch".to_string());

        let project_id = match events.first().and_then(|e| e.project_id.as_ref()) {
            Some(first) if events.iter().all(|e| e.project_id.as_ref() == Some(first)) => {
                Some(first.clone())
            }
            _ => None,
        };

        Self {
            source_type,
            reference,
            project_id,
        }
    }

    fn memory_from(&self, candidate: ExtractedMemory) -> Memory {
        Memory::new(
            candidate.memory_type,
            candidate.content,
            candidate.summary,
            Source {
                source_type: self.source_type,
                reference: self.reference.clone(),
                timestamp: Utc::now(),
            },
            candidate.confidence,
        )
        .with_topics(candidate.topics)
        .with_project(self.project_id.clone())
    }
}
