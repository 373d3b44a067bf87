use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ReadingStore, StoreError};
use crate::db::models::{NewReading, StoredReading};

/// `sensor_readings` table backed store. Every sqlx failure surfaces as
/// [`StoreError::Unavailable`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn append(&self, reading: NewReading) -> Result<StoredReading, StoreError> {
        let row = sqlx::query_as::<_, StoredReading>(
            r#"
            INSERT INTO sensor_readings (sensor_id, value, recorded_at, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id, sensor_id, value, recorded_at, created_at
            "#,
        )
        .bind(reading.sensor_id)
        .bind(reading.value)
        .bind(reading.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn range_scan(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, StoreError> {
        let rows = sqlx::query_as::<_, StoredReading>(
            r#"
            SELECT id, sensor_id, value, recorded_at, created_at
            FROM sensor_readings
            WHERE recorded_at >= $1
              AND recorded_at <= $2
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sensor_readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
