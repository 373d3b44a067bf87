use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ReadingStore, StoreError};
use crate::db::models::{NewReading, StoredReading};

/// In-memory reading store ordered by `(timestamp, id)`.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Appends take the write lock for the whole insert, so id assignment and
/// insertion happen as one step.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    readings: BTreeMap<(DateTime<Utc>, i64), StoredReading>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn append(&self, reading: NewReading) -> Result<StoredReading, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let stored = StoredReading::from_new(inner.last_id, reading, Utc::now());
        inner
            .readings
            .insert((stored.timestamp, stored.id), stored.clone());
        Ok(stored)
    }

    async fn range_scan(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().await;
        Ok(inner
            .readings
            .range((start, i64::MIN)..=(end, i64::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.inner.read().await.readings.len() as i64)
    }
}
