use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use tokio::time;
use tracing::{error, info, warn};

use crate::{api::dto::NewReadingRequest, config::EmulatorConfig};

/// Upper bound for a single POST, so a stalled processor fails the sweep.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed waits between sweeps. No jitter and no growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub period: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn next_delay(&self, sweep_ok: bool) -> Duration {
        if sweep_ok {
            self.period
        } else {
            self.backoff
        }
    }
}

/// Synthetic producer posting random readings to a running processor.
pub struct Emulator {
    client: reqwest::Client,
    endpoint: String,
    sensor_count: i32,
    policy: RetryPolicy,
}

impl Emulator {
    pub fn new(config: &EmulatorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/sensor/data", config.processor_url),
            sensor_count: config.sensor_count,
            policy: RetryPolicy {
                period: config.interval,
                backoff: config.backoff,
            },
        })
    }

    /// Post one reading per sensor.
    ///
    /// A transport error aborts the sweep. Rejected readings are logged and
    /// the remaining sensors are still sent; the sweep then counts as failed.
    pub async fn sweep(&self) -> Result<()> {
        let mut rejected = 0;

        for sensor_id in 1..=self.sensor_count {
            let reading = NewReadingRequest {
                sensor_id,
                value: rand::rng().random_range(0.0..100.0),
                timestamp: Utc::now(),
            };

            let resp = self
                .client
                .post(&self.endpoint)
                .json(&reading)
                .send()
                .await
                .with_context(|| format!("failed to reach {}", self.endpoint))?;

            let status = resp.status();
            if status.is_success() {
                info!(sensor_id, value = reading.value, "Reading sent");
            } else {
                let body = resp.text().await.unwrap_or_default();
                warn!(sensor_id, status = %status, body = %body, "Reading rejected");
                rejected += 1;
            }
        }

        if rejected > 0 {
            anyhow::bail!("{rejected} of {} readings rejected", self.sensor_count);
        }
        Ok(())
    }

    /// Sweep until `shutdown` resolves. An in-flight sweep is abandoned
    /// when it does. Spawn via `tokio::spawn` or await directly from a binary.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(
            endpoint = %self.endpoint,
            sensors = self.sensor_count,
            interval_ms = self.policy.period.as_millis() as u64,
            "Sensor emulator started"
        );
        tokio::pin!(shutdown);

        loop {
            let ok = tokio::select! {
                _ = &mut shutdown => break,
                res = self.sweep() => match res {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, backoff_ms = self.policy.backoff.as_millis() as u64, "Sweep failed");
                        false
                    }
                },
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = time::sleep(self.policy.next_delay(ok)) => {}
            }
        }

        info!("Sensor emulator stopped");
    }
}
