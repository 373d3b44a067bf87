pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::{NewReading, StoredReading};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Ordered, append-only persistence of readings.
///
/// Implementations must make a single `append` atomic and hand out unique,
/// increasing ids to concurrent callers. A `range_scan` may run alongside
/// appends and need not observe those that commit while it runs.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist `reading`, assigning `id` and `created_at`.
    async fn append(&self, reading: NewReading) -> Result<StoredReading, StoreError>;

    /// Readings with `start <= timestamp <= end`, ascending by timestamp,
    /// ties broken by id.
    async fn range_scan(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
