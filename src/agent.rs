//! Background agent: producers, dispatcher and decay scheduler wired to one
//! store.
//!
//! Shutdown order: cancel the shared token, wait for every worker task, then
//! release the store. Nothing writes to the store after [`Agent::shutdown`]
//! returns.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MemoryPilotConfig;
use crate::db::{self, SharedDb};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extraction::{create_extractor, Extractor};
use crate::pipeline::decay::DecayScheduler;
use crate::pipeline::dispatcher::{Dispatcher, DispatcherConfig};
use crate::pipeline::queue::{event_queue, EventSink};
use crate::service::check_embedding_model;
use crate::watcher::{configured_watchers, Watcher};

pub struct Agent {
    db: SharedDb,
    sink: EventSink,
    shutdown: CancellationToken,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Agent {
    /// Open the configured store and start every worker the config enables.
    pub async fn start(config: &MemoryPilotConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_existing(&db_path)?;
        let extractor = create_extractor(&config.extraction)?;
        let embedder = create_provider(&config.embedding)?;
        check_embedding_model(&conn, embedder.as_ref());
        tracing::info!(db = %db_path.display(), "agent starting");

        Ok(Self::with_parts(
            db::shared(conn),
            extractor,
            embedder,
            config,
            configured_watchers(&config.watchers),
        ))
    }

    /// Start workers on an already opened store with explicit gateways and
    /// producers.
    pub fn with_parts(
        db: SharedDb,
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &MemoryPilotConfig,
        watchers: Vec<Box<dyn Watcher>>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (sink, queue) = event_queue(config.pipeline.queue_capacity);
        let mut workers = Vec::new();

        let dispatcher = Dispatcher::new(
            db.clone(),
            extractor,
            embedder,
            DispatcherConfig::from_config(config),
        );
        workers.push(("dispatcher", dispatcher.spawn(queue, shutdown.child_token())));

        let decay = DecayScheduler::new(db.clone(), config.maintenance.decay_interval());
        workers.push(("decay", decay.spawn(shutdown.child_token())));

        for watcher in watchers {
            let name = watcher.name();
            match watcher.start(sink.clone(), shutdown.child_token()) {
                Ok(handle) => workers.push((name, handle)),
                Err(e) => tracing::warn!(watcher = name, error = %e, "watcher failed to start, skipping"),
            }
        }

        tracing::info!(workers = workers.len(), "agent running");
        Self {
            db,
            sink,
            shutdown,
            workers,
        }
    }

    /// Sink for submitting events from outside the configured producers.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    /// Names of the running workers, producers included.
    pub fn worker_names(&self) -> Vec<&'static str> {
        self.workers.iter().map(|(name, _)| *name).collect()
    }

    /// Stop every worker and wait for it, then release the store.
    pub async fn shutdown(self) {
        tracing::info!("agent shutting down");
        self.shutdown.cancel();
        for (name, handle) in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(worker = name, error = %e, "worker ended abnormally");
            }
        }
        tracing::info!(dropped_events = self.sink.dropped(), "agent stopped");
        drop(self.db);
    }
}

/// Run the agent until Ctrl-C or SIGTERM.
pub async fn run_until_signal(config: &MemoryPilotConfig) -> Result<()> {
    let agent = Agent::start(config).await?;
    wait_for_signal().await;
    agent.shutdown().await;
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NullEmbedder;
    use crate::extraction::NullExtractor;

    struct FailingWatcher;

    impl Watcher for FailingWatcher {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn start(
            self: Box<Self>,
            _sink: EventSink,
            _shutdown: CancellationToken,
        ) -> Result<JoinHandle<()>> {
            anyhow::bail!("root unreadable")
        }
    }

    struct IdleWatcher;

    impl Watcher for IdleWatcher {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn start(
            self: Box<Self>,
            _sink: EventSink,
            shutdown: CancellationToken,
        ) -> Result<JoinHandle<()>> {
            Ok(tokio::spawn(async move { shutdown.cancelled().await }))
        }
    }

    #[tokio::test]
    async fn failed_watcher_is_excluded() {
        let db = db::shared(db::open_memory_database().unwrap());
        let agent = Agent::with_parts(
            db,
            Arc::new(NullExtractor),
            Arc::new(NullEmbedder),
            &MemoryPilotConfig::default(),
            vec![Box::new(FailingWatcher), Box::new(IdleWatcher)],
        );
        assert_eq!(agent.worker_names(), vec!["dispatcher", "decay", "idle"]);

        tokio::time::timeout(std::time::Duration::from_secs(5), agent.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_requires_initialized_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = MemoryPilotConfig::default();
        config.storage.db_path = tmp.path().join("nope.db").to_string_lossy().into_owned();
        let err = Agent::start(&config).await.err().unwrap();
        assert!(err.to_string().contains("not initialized"));
    }
}
