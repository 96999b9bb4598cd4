//! Storage error taxonomy.
//!
//! Everything under [`crate::memory`] returns [`StoreError`]. Callers on the
//! user-facing surfaces turn it into a readable message; background workers log
//! it and move on to their next cycle.

use std::path::PathBuf;

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No database exists yet at the configured path.
    #[error("MemoryPilot not initialized (no database at {}); run `memorypilot init`", .0.display())]
    NotInitialized(PathBuf),

    /// Constraint violation, I/O failure or corruption reported by SQLite.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back onto the data model.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared connection mutex was poisoned by a panicking writer.
    #[error("database lock poisoned")]
    LockPoisoned,

    /// The blocking task running the operation panicked or was cancelled.
    #[error("database task failed: {0}")]
    Task(String),
}
