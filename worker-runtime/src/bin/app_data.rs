//! `app_data` worker process: the sole write funnel onto derived-data
//! stores (`spec.md` §2/§4.6). One `AppRunner` is spawned per configured
//! catalog, each with its own `CatalogStore` handle — mirroring
//! `tasksd`'s per-catalog scheduler loop in `src/main.rs`, including that
//! pattern's existing limitation that every loop competes for the same
//! durable `app_data-inbound` consumer rather than partitioning by
//! catalog at the queue level (see DESIGN.md).

use anyhow::{Context, Result};
use sonicat::appdata::analysis::AnalysisStore;
use sonicat::appdata::metadata::MetadataStore;
use sonicat::appdata::tokens::TokenStore;
use sonicat::catalog::CatalogStore;
use sonicat::config;
use sonicat::nats::{NatsClient, TaskQueue};
use sonicat_workers::workers::app_data::AppDataWorker;
use sonicat_workers::AppRunner;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();
    info!("app_data worker starting");

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let nats_client = NatsClient::connect(config.nats.clone()).await.context("failed to connect to NATS")?;
    let queue = TaskQueue::new(nats_client.jetstream().clone(), config.nats.stream_name.clone());

    if config.catalogs.is_empty() {
        warn!("no catalogs configured, app_data has nothing to do");
    }

    let catalog_dir = config.data_dir("catalog");
    std::fs::create_dir_all(&catalog_dir).context("failed to create catalog data directory")?;

    let mut handles = Vec::new();
    for catalog_name in config.catalog_names() {
        let catalog = CatalogStore::open(catalog_dir.join(format!("{catalog_name}.sqlite")))
            .with_context(|| format!("failed to open catalog store for '{catalog_name}'"))?;
        let worker = build_worker(&config, catalog)?;
        let runner = AppRunner::new(worker, queue.clone(), Duration::from_secs(config.tasks.idle_sleep_seconds));
        handles.push(tokio::spawn(async move {
            info!(catalog = %catalog_name, "app_data runner starting");
            runner.run().await;
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "app_data runner task panicked");
        }
    }
    Ok(())
}

fn build_worker(config: &sonicat::config::SonicatConfig, catalog: CatalogStore) -> Result<AppDataWorker> {
    let analysis_dir = config.data_dir("analysis");
    std::fs::create_dir_all(&analysis_dir).context("failed to create analysis data directory")?;
    let analysis = AnalysisStore::open(analysis_dir.join("librosa.sqlite")).context("failed to open analysis store")?;

    let tokens_dir = config.data_dir("tokens");
    std::fs::create_dir_all(&tokens_dir).context("failed to create tokens data directory")?;
    let tokens = TokenStore::open(tokens_dir.join("path_parser.sqlite")).context("failed to open tokens store")?;

    let metadata_dir = config.data_dir("metadata");
    std::fs::create_dir_all(&metadata_dir).context("failed to create metadata data directory")?;
    let mut metadata: HashMap<String, MetadataStore> = HashMap::new();
    for app_name in ["discogs", "lastfm", "rutracker_scraper"] {
        let store = MetadataStore::open(metadata_dir.join(format!("{app_name}.sqlite")))
            .with_context(|| format!("failed to open metadata store for '{app_name}'"))?;
        metadata.insert(app_name.to_string(), store);
    }

    Ok(AppDataWorker::new(catalog, analysis, tokens, metadata))
}
