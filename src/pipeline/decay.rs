//! Decay scheduler: one importance-decay pass per interval.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::{with_db, SharedDb};
use crate::memory::maintenance::decay_importance;

pub struct DecayScheduler {
    db: SharedDb,
    interval: Duration,
}

impl DecayScheduler {
    pub fn new(db: SharedDb, interval: Duration) -> Self {
        Self { db, interval }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// First pass runs one full interval after start. Cancellation is only
    /// observed between passes, so a pass is never cut short.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "decay scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        tracing::info!("decay scheduler stopped");
    }

    /// One pass. A storage failure is logged and reported as `None`.
    pub async fn run_once(&self) -> Option<usize> {
        match with_db(&self.db, |conn| decay_importance(conn)).await {
            Ok(affected) => Some(affected),
            Err(e) => {
                tracing::error!(error = %e, "importance decay failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{create_memory, get_memory};
    use crate::memory::types::{Memory, MemoryType, Source, SourceType};
    use chrono::Utc;

    async fn stale_memory(db: &SharedDb, importance: f64) -> String {
        let old = Utc::now() - chrono::Duration::days(3);
        let mut memory = Memory::new(
            MemoryType::Pattern,
            "Wrap DB calls in spawn_blocking",
            "spawn_blocking for DB",
            Source {
                source_type: SourceType::Manual,
                reference: "cli".into(),
                timestamp: old,
            },
            1.0,
        )
        .with_importance(importance);
        memory.last_accessed_at = old;
        let id = memory.id.clone();
        with_db(db, move |conn| create_memory(conn, &memory)).await.unwrap();
        id
    }

    async fn importance(db: &SharedDb, id: &str) -> f64 {
        let id = id.to_string();
        with_db(db, move |conn| get_memory(conn, &id))
            .await
            .unwrap()
            .unwrap()
            .importance
    }

    #[tokio::test]
    async fn run_once_decays_stale_memories() {
        let db = db::shared(db::open_memory_database().unwrap());
        let id = stale_memory(&db, 0.5).await;
        let scheduler = DecayScheduler::new(db.clone(), Duration::from_secs(3600));

        assert_eq!(scheduler.run_once().await, Some(1));
        assert!((importance(&db, &id).await - 0.495).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ticks_apply_decay_until_cancelled() {
        let db = db::shared(db::open_memory_database().unwrap());
        let id = stale_memory(&db, 0.5).await;
        let shutdown = CancellationToken::new();
        let handle = DecayScheduler::new(db.clone(), Duration::from_millis(40)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let after = importance(&db, &id).await;
        assert!(after < 0.5);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(importance(&db, &id).await, after);
    }

    #[tokio::test]
    async fn cancel_before_first_interval_runs_nothing() {
        let db = db::shared(db::open_memory_database().unwrap());
        let id = stale_memory(&db, 0.5).await;
        let shutdown = CancellationToken::new();
        let handle = DecayScheduler::new(db.clone(), Duration::from_secs(3600)).spawn(shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(importance(&db, &id).await, 0.5);
    }
}
