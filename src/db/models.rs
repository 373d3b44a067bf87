use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A reading as supplied by a caller, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub sensor_id: i32,
    pub value: f64,
    /// When the sensor took the reading.
    pub timestamp: DateTime<Utc>,
}

impl NewReading {
    /// Drop precision below one microsecond, the resolution of `TIMESTAMPTZ`.
    pub fn truncated_to_micros(mut self) -> Self {
        self.timestamp = self.timestamp.trunc_subsecs(6);
        self
    }
}

/// Mirrors a row of the `sensor_readings` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: i64,
    pub sensor_id: i32,
    pub value: f64,
    #[sqlx(rename = "recorded_at")]
    pub timestamp: DateTime<Utc>,
    /// Persistence time. Audit only, never exposed through the API.
    pub created_at: DateTime<Utc>,
}

impl StoredReading {
    pub fn from_new(id: i64, reading: NewReading, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            sensor_id: reading.sensor_id,
            value: reading.value,
            timestamp: reading.timestamp,
            created_at,
        }
    }
}

/// Per-sensor statistics over a window. Derived on every query, never stored.
///
/// All three figures are rounded to 2 decimal places, half away from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SensorSummary {
    pub sensor_id: i32,
    pub average: f64,
    pub max: f64,
    pub min: f64,
}
