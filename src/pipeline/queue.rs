//! Bounded multi-producer event queue.
//!
//! Producers hold a cloneable [`EventSink`]; the dispatcher owns the single
//! [`EventQueue`]. `submit` never blocks and never fails from the producer's
//! point of view. When the queue is full the new event is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::event::Event;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Drops logged at warn level: the first one, then every this many.
const DROP_WARN_EVERY: u64 = 100;

/// Create a connected sink/queue pair holding at most `capacity` events.
pub fn event_queue(capacity: usize) -> (EventSink, EventQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSink {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventQueue { rx, dropped },
    )
}

/// Producer handle. Cheap to clone; one per watcher.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// Fire-and-forget enqueue.
    pub fn submit(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total == 1 || total % DROP_WARN_EVERY == 0 {
                    tracing::warn!(
                        kind = event.kind(),
                        dropped_total = total,
                        "event queue full, dropping event"
                    );
                } else {
                    tracing::debug!(kind = event.kind(), dropped_total = total, "event dropped");
                }
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(kind = event.kind(), "event queue closed, discarding event");
            }
        }
    }

    /// Events dropped on overflow since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side, owned by the dispatcher.
pub struct EventQueue {
    rx: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    /// Next event, or `None` once every sink is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive; `None` when nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
