//! `lastfm` worker process: searches Last.fm for a release matching an
//! asset's cname (`spec.md` §4.4), validated against measured durations.

use anyhow::{Context, Result};
use sonicat::appdata::analysis::AnalysisStore;
use sonicat::config::{self, secrets};
use sonicat::nats::{NatsClient, TaskQueue};
use sonicat_workers::workers::lastfm::{LastfmClient, LastfmWorker};
use sonicat_workers::AppRunner;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();
    info!("lastfm worker starting");

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let secrets_path = std::env::var("SONICAT_SECRETS").unwrap_or_else(|_| "secrets.toml".to_string());
    let secrets = secrets::load_secrets(&secrets_path).context("failed to load sonicat secrets")?;
    let secret = secrets.lastfm.context("secrets.toml has no [lastfm] section")?;

    let nats_client = NatsClient::connect(config.nats.clone()).await.context("failed to connect to NATS")?;
    let queue = TaskQueue::new(nats_client.jetstream().clone(), config.nats.stream_name.clone());

    let analysis_path = config.data_dir("analysis").join("librosa.sqlite");
    std::fs::create_dir_all(analysis_path.parent().unwrap()).context("failed to create analysis data directory")?;
    let analysis = AnalysisStore::open(&analysis_path).context("failed to open analysis store")?;

    let client = LastfmClient::new(reqwest::Client::new(), secret);
    let runner = AppRunner::new(LastfmWorker::new(client, analysis), queue, Duration::from_secs(config.tasks.idle_sleep_seconds));
    runner.run().await;
    Ok(())
}
