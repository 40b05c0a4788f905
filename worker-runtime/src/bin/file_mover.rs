//! `file_mover` worker process: the only worker allowed to touch the
//! managed tree or shell out to `rar`/`unrar` (`spec.md` §2/§9).

use anyhow::{Context, Result};
use sonicat::config;
use sonicat::filemover::FileMover;
use sonicat::nats::{NatsClient, TaskQueue};
use sonicat_workers::workers::file_mover::FileMoverWorker;
use sonicat_workers::AppRunner;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();
    info!("file_mover worker starting");

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let nats_client = NatsClient::connect(config.nats.clone()).await.context("failed to connect to NATS")?;
    let queue = TaskQueue::new(nats_client.jetstream().clone(), config.nats.stream_name.clone());

    let mover = FileMover::with_temp_root(config.temp_dir("file_mover"));
    let runner = AppRunner::new(FileMoverWorker::with_mover(mover), queue, Duration::from_secs(config.tasks.idle_sleep_seconds));
    runner.run().await;
    Ok(())
}
