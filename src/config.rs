use std::{fmt, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};

/// Where readings are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local; contents are lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown STORE_BACKEND '{other}', expected 'postgres' or 'memory'"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    /// Only read when `store_backend` is Postgres.
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    /// Largest accepted XML upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store_backend: StoreBackend = optional(&var, "STORE_BACKEND", "postgres").parse()?;
        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required(&var, "DATABASE_URL")?),
            StoreBackend::Memory => None,
        };

        Ok(Self {
            store_backend,
            database_url,
            server_host: optional(&var, "SERVER_HOST", "0.0.0.0"),
            server_port: optional(&var, "SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            max_upload_bytes: optional(&var, "MAX_UPLOAD_BYTES", "5242880")
                .parse()
                .context("MAX_UPLOAD_BYTES must be a positive integer")?,
        })
    }
}

/// Settings for the `sensor_emulator` binary.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Base URL of the processor, e.g. `http://localhost:8080`.
    pub processor_url: String,
    /// Sensors `1..=sensor_count` report on every sweep.
    pub sensor_count: i32,
    pub interval: Duration,
    /// Wait after a failed sweep.
    pub backoff: Duration,
}

impl EmulatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let sensor_count: i32 = optional(&var, "SENSOR_COUNT", "3")
            .parse()
            .context("SENSOR_COUNT must be an integer")?;
        if sensor_count < 1 {
            bail!("SENSOR_COUNT must be at least 1");
        }

        Ok(Self {
            processor_url: required(&var, "PROCESSOR_URL")?
                .trim_end_matches('/')
                .to_owned(),
            sensor_count,
            interval: Duration::from_millis(
                optional(&var, "EMULATOR_INTERVAL_MS", "1000")
                    .parse()
                    .context("EMULATOR_INTERVAL_MS must be a positive integer")?,
            ),
            backoff: Duration::from_millis(
                optional(&var, "EMULATOR_BACKOFF_MS", "5000")
                    .parse()
                    .context("EMULATOR_BACKOFF_MS must be a positive integer")?,
            ),
        })
    }
}

fn required(var: impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(var: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_owned())
}
