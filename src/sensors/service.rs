use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::{aggregator, validator};
use crate::{
    db::models::{NewReading, SensorSummary, StoredReading},
    store::{ReadingStore, StoreError},
    upload::{self, StructureReport},
};

/// Longest window accepted by [`SensorService::readings`].
pub const MAX_QUERY_RANGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Outcome of [`SensorService::health`].
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub can_connect: bool,
    /// `0` when the store could not be counted.
    pub record_count: i64,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Start date must be before end date")]
    Inverted,
    #[error("Time range cannot exceed {max_days} days")]
    TooLong { max_days: i64 },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reject windows that are empty or inverted, and those longer than
/// `max_days` when a cap is given.
pub fn check_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_days: Option<i64>,
) -> Result<(), RangeError> {
    if start >= end {
        return Err(RangeError::Inverted);
    }
    if let Some(max_days) = max_days {
        if end - start > Duration::days(max_days) {
            return Err(RangeError::TooLong { max_days });
        }
    }
    Ok(())
}

/// Entry point for ingestion, range queries, summaries and uploads.
///
/// Validation and window errors are returned before the store is touched.
/// Store errors pass through unchanged and are never retried here.
#[derive(Clone)]
pub struct SensorService {
    store: Arc<dyn ReadingStore>,
}

impl SensorService {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    pub async fn add_reading(&self, reading: NewReading) -> Result<StoredReading, ServiceError> {
        self.add_reading_at(reading, Utc::now()).await
    }

    /// Validate `reading` as of `now` and persist it.
    ///
    /// The timestamp is cut to whole microseconds first, so every store
    /// hands back exactly what was validated.
    pub async fn add_reading_at(
        &self,
        reading: NewReading,
        now: DateTime<Utc>,
    ) -> Result<StoredReading, ServiceError> {
        let reading = reading.truncated_to_micros();
        if let Err(errors) = validator::validate(&reading, now) {
            warn!(
                sensor_id = reading.sensor_id,
                violations = errors.len(),
                details = %errors,
                "Rejected sensor reading"
            );
            return Err(errors.into());
        }

        let stored = self.store.append(reading).await?;
        info!(
            id = stored.id,
            sensor_id = stored.sensor_id,
            value = stored.value,
            "Sensor reading persisted"
        );
        Ok(stored)
    }

    /// Readings with timestamps in `[start, end]`, oldest first.
    ///
    /// The window must be non-empty and at most [`MAX_QUERY_RANGE_DAYS`] long.
    pub async fn readings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, ServiceError> {
        check_window(start, end, Some(MAX_QUERY_RANGE_DAYS))?;

        let rows = self.store.range_scan(start, end).await?;
        debug!(%start, %end, rows = rows.len(), "Range query");
        Ok(rows)
    }

    /// Per-sensor statistics over `[start, end]`.
    ///
    /// Unlike [`Self::readings`], the window length is not capped.
    pub async fn summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorSummary>, ServiceError> {
        check_window(start, end, None)?;

        let rows = self.store.range_scan(start, end).await?;
        let summary = aggregator::summarize(&rows);
        debug!(%start, %end, rows = rows.len(), sensors = summary.len(), "Summary query");
        Ok(summary)
    }

    /// Structural check of a bulk document. Records are not ingested.
    pub fn process_upload(&self, document: &[u8]) -> StructureReport {
        let report = upload::validate_structure(document);
        if report.is_valid {
            info!(bytes = document.len(), notices = report.errors.len(), "XML upload validated");
        } else {
            warn!(bytes = document.len(), errors = report.errors.len(), "XML upload rejected");
        }
        report
    }

    /// Store reachability and size. Never fails; problems show up as
    /// [`HealthStatus::Unhealthy`].
    pub async fn health(&self) -> HealthReport {
        let check = match self.store.ping().await {
            Ok(()) => self.store.count().await.map(|n| (true, n)).map_err(|e| (true, e)),
            Err(e) => Err((false, e)),
        };

        let (status, can_connect, record_count) = match check {
            Ok((can_connect, n)) => (HealthStatus::Healthy, can_connect, n),
            Err((can_connect, e)) => {
                warn!(error = %e, can_connect, "Health check failed");
                (HealthStatus::Unhealthy, can_connect, 0)
            }
        };

        HealthReport {
            status,
            can_connect,
            record_count,
            checked_at: Utc::now(),
        }
    }
}
