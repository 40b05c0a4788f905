//! `rutracker_scraper` worker process: scrapes RuTracker's search
//! results page for a release matching an asset's cname (`spec.md` §4.4).
//! Needs no secrets and no `AnalysisStore` handle — listing pages carry
//! no per-track durations, so its acceptance rule never validates
//! against measured durations.

use anyhow::{Context, Result};
use sonicat::config;
use sonicat::nats::{NatsClient, TaskQueue};
use sonicat_workers::workers::rutracker_scraper::{RutrackerClient, RutrackerScraperWorker};
use sonicat_workers::AppRunner;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();
    info!("rutracker_scraper worker starting");

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let nats_client = NatsClient::connect(config.nats.clone()).await.context("failed to connect to NATS")?;
    let queue = TaskQueue::new(nats_client.jetstream().clone(), config.nats.stream_name.clone());

    let client = RutrackerClient::new(reqwest::Client::new());
    let runner = AppRunner::new(RutrackerScraperWorker::new(client), queue, Duration::from_secs(config.tasks.idle_sleep_seconds));
    runner.run().await;
    Ok(())
}
