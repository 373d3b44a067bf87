//! Posts random readings for sensors `1..=SENSOR_COUNT` to a running
//! processor once per interval.
//!
//! Usage:
//!   PROCESSOR_URL=http://localhost:8080 cargo run --bin sensor_emulator

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sensor_processor::{config::EmulatorConfig, emulator::Emulator, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = EmulatorConfig::from_env()?;
    Emulator::new(&config)?.run(shutdown::signal()).await;

    Ok(())
}
