//! Event storage
//!
//! Request handlers only see the [`EventStore`] trait. The crate ships a
//! SQLite implementation; tests substitute recording stubs.

pub mod maintenance;
pub mod sink;
pub mod sqlite;

pub use sink::ResultSink;
pub use sqlite::SqliteEventStore;

use crate::event::Event;
use crate::query::SearchQuery;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The response body was dropped, usually because the client went away
    #[error("response sink closed")]
    SinkClosed,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Backend(String),
}

/// Outcome of one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub used_bytes_before: u64,
    pub used_bytes_after: u64,
    pub partitions_dropped: Vec<String>,
    pub rows_deleted: u64,
}

/// Storage operations consumed by the request pipeline and maintenance tasks.
///
/// Implementations must be safe to call from many in-flight requests at once.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Create base tables if they do not exist
    async fn initialize_schema(&self) -> Result<(), StoreError>;

    /// Apply pending schema migrations
    async fn run_migrations(&self) -> Result<(), StoreError>;

    /// Create secondary indices. Callers treat failure as non-fatal.
    async fn create_indices(&self) -> Result<(), StoreError>;

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Stream the results of `query` into `sink`, encoded per the query's
    /// export format.
    ///
    /// Output is written as it is produced. On error, part of the result may
    /// already be in the sink; callers cannot retract it.
    async fn search(&self, query: &SearchQuery, sink: &mut ResultSink) -> Result<(), StoreError>;

    /// One retention pass: drop the oldest data until stored volume fits in
    /// `capacity_gb` gigabytes.
    async fn sweep_retention(&self, capacity_gb: u64) -> Result<SweepStats, StoreError>;

    /// One partition-maintenance pass. Returns the number of partitions created.
    async fn maintain_partitions(&self) -> Result<u64, StoreError>;
}
