//! `inventory` worker process: surveys an intake directory's files and
//! hands the result to `app_data` for cataloging, per `spec.md` §4.4.
//! Bootstrap mirrors `tasksd`'s `main.rs` (env-var config path,
//! `tracing_subscriber` init, NATS connect) with the scheduler loop
//! replaced by one `AppRunner`.

use anyhow::{Context, Result};
use sonicat::config;
use sonicat::nats::{NatsClient, TaskQueue};
use sonicat_workers::workers::inventory::InventoryWorker;
use sonicat_workers::AppRunner;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();
    info!("inventory worker starting");

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let nats_client = NatsClient::connect(config.nats.clone()).await.context("failed to connect to NATS")?;
    let queue = TaskQueue::new(nats_client.jetstream().clone(), config.nats.stream_name.clone());

    let runner = AppRunner::new(InventoryWorker::new(), queue, Duration::from_secs(config.tasks.idle_sleep_seconds));
    runner.run().await;
    Ok(())
}
