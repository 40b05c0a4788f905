//! `catalog_intake` CLI: runs one `reconcile` or `batch_intake` action
//! against a catalog, per `spec.md` §4.5's note that this worker sits
//! outside the live `route_target` routing graph — it is
//! operator-triggered rather than driven off a queue, so this binary
//! runs a single Task to completion and exits instead of polling NATS
//! like the other eight workers.
//!
//! Usage: `catalog_intake <catalog_name> <reconcile|batch_intake> <json_args>`

use anyhow::{bail, Context, Result};
use sonicat::catalog::CatalogStore;
use sonicat::config;
use sonicat::task::Task;
use sonicat_workers::workers::catalog_intake::CatalogIntakeWorker;
use sonicat_workers::Worker;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();

    let mut argv = std::env::args().skip(1);
    let catalog_name = argv.next().context("usage: catalog_intake <catalog_name> <reconcile|batch_intake> <json_args>")?;
    let action = argv.next().context("missing action (reconcile|batch_intake)")?;
    let args_json = argv.next().unwrap_or_else(|| "{}".to_string());
    let args: serde_json::Value = serde_json::from_str(&args_json).context("json_args must be valid JSON")?;

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let catalog_dir = config.data_dir("catalog");
    std::fs::create_dir_all(&catalog_dir).context("failed to create catalog data directory")?;
    let catalog = CatalogStore::open(catalog_dir.join(format!("{catalog_name}.sqlite")))
        .with_context(|| format!("failed to open catalog store for '{catalog_name}'"))?;

    let worker = CatalogIntakeWorker::new(catalog);
    let task = Task::new("operator".to_string(), "catalog_intake", action, args);
    let done = worker.run_task(task).await;

    match done.last_result() {
        Some(result) if result.success => {
            info!(payload = %result.payload, "catalog_intake succeeded");
            println!("{}", result.payload);
            Ok(())
        }
        Some(result) => bail!("catalog_intake failed: {}", result.message.clone().unwrap_or_default()),
        None => bail!("catalog_intake produced no result"),
    }
}
