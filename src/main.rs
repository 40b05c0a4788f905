//! `tasksd`: the Tasks scheduler process (`spec.md` §4.1). One instance
//! runs per configured catalog, each driving its own `TasksScheduler`
//! against the shared NATS queue substrate: pulling completions off
//! `sonicat.tasks.inbound`, calling `run_cycle`, and publishing whatever
//! it emits onto the target worker's `inbound` queue per `route_target`.
//!
//! Styled after the teacher's `main.rs` bootstrap (env-var config path,
//! `tracing_subscriber` init, NATS connect, snapshot recovery) with the
//! HTTP/axum surface replaced by the scheduler loop this binary actually
//! runs.

use anyhow::{Context, Result};
use sonicat::appdata::analysis::AnalysisStore;
use sonicat::appdata::metadata::MetadataStore;
use sonicat::appdata::tokens::TokenStore;
use sonicat::appdata::AppDataStore;
use sonicat::catalog::{CatalogReplica, CatalogStore};
use sonicat::config::{self, CatalogConfig, SonicatConfig};
use sonicat::nats::{NatsClient, QueueKind, TaskQueue};
use sonicat::router::route_target;
use sonicat::scheduler::{CompletionSource, TasksScheduler};
use sonicat::snapshot::manager::SnapshotManager;
use sonicat::snapshot::recovery::load_latest_snapshot;
use sonicat::task::Task;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonicat=info".into()))
        .init();

    info!("tasksd starting");

    let config_path = std::env::var("SONICAT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::load_config(&config_path).context("failed to load sonicat config")?;

    let nats_client = NatsClient::connect(config.nats.clone()).await.context("failed to connect to NATS")?;
    let queue = TaskQueue::new(nats_client.jetstream().clone(), config.nats.stream_name.clone());
    info!("NATS task queue ready");

    let mut schedulers = HashMap::new();
    for (catalog_name, catalog_config) in &config.catalogs {
        let scheduler = build_scheduler(&config, catalog_name, catalog_config)
            .with_context(|| format!("failed to build scheduler for catalog '{catalog_name}'"))?;
        schedulers.insert(catalog_name.clone(), Arc::new(scheduler));
    }

    if schedulers.is_empty() {
        warn!("no catalogs configured, tasksd has nothing to do");
    }

    for (catalog_name, scheduler) in &schedulers {
        for task in scheduler.reclaim_orphans().context("orphan reclamation failed")? {
            dispatch(&queue, task).await;
        }
        info!(catalog = %catalog_name, "orphan reclamation complete");

        // A second, read-only handle onto the same sqlite file backs the
        // snapshot loop so it never competes with the scheduler's own
        // writable connection for the catalog's single-writer lock.
        let catalog_path = config.data_dir("catalog").join(format!("{catalog_name}.sqlite"));
        let replica = Arc::new(CatalogStore::open_replica(&catalog_path).context("failed to open catalog replica for snapshotting")?);
        let snapshot_manager = SnapshotManager::new(replica, config.snapshot.clone(), format!("catalog-{catalog_name}"));
        let catalog_name_owned = catalog_name.clone();
        tokio::spawn(async move {
            if let Err(e) = snapshot_manager.run_snapshot_loop().await {
                error!(catalog = %catalog_name_owned, error = %e, "snapshot loop exited");
            }
        });
    }

    let mut handles = Vec::new();
    for (catalog_name, scheduler) in schedulers {
        let queue = queue.clone();
        handles.push(tokio::spawn(run_catalog_loop(catalog_name, scheduler, queue)));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "scheduler task panicked");
        }
    }

    Ok(())
}

/// One catalog's scheduling loop: pull a completion off `tasks.inbound`
/// (or idle-tick `None` through `run_cycle` to generate fresh work),
/// dispatch whatever it emits, and finalize the `managed` flag once an
/// intake asset's `file_mover.archive` step reports success.
async fn run_catalog_loop(catalog_name: String, scheduler: Arc<TasksScheduler>, queue: TaskQueue) {
    loop {
        let (incoming, ack) = match queue.next("tasks", QueueKind::Inbound).await {
            Ok(Some((task, ack))) => (Some(task), Some(ack)),
            Ok(None) => (None, None),
            Err(e) => {
                warn!(catalog = %catalog_name, error = %e, "tasks inbound poll failed");
                (None, None)
            }
        };

        if let Some(task) = &incoming {
            finalize_archive_if_applicable(&scheduler, task);
        }

        let emitted = match scheduler.run_cycle(incoming.clone()) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(catalog = %catalog_name, error = %e, "run_cycle failed");
                Vec::new()
            }
        };

        if emitted.is_empty() && incoming.is_none() {
            tokio::time::sleep(scheduler.idle_sleep).await;
            continue;
        }

        for task in emitted {
            dispatch(&queue, task).await;
        }

        // Acked only now that the incoming completion has been folded
        // into the scheduler's PendingCache and every successor
        // dispatched — a crash before this point redelivers rather than
        // silently dropping the completion.
        if let Some(ack) = ack {
            if let Err(e) = ack.ack().await {
                error!(catalog = %catalog_name, error = %e, "failed to ack processed tasks-inbound message");
            }
        }
    }
}

/// SUPPLEMENT (`SPEC_FULL.md` §4.5): the scheduler itself is the only
/// place that ever sees a completed `file_mover.archive` Task come back
/// (per `route_target`, `file_mover` always routes to `tasks`), so this
/// is where the asset's `managed` flag flips from false to true once the
/// archive physically exists on disk.
fn finalize_archive_if_applicable(scheduler: &TasksScheduler, task: &Task) {
    if task.app_name != "file_mover" || task.action != "archive" || !task.succeeded() {
        return;
    }
    let Some(path) = task.args.get("path").and_then(|v| v.as_str()) else { return };
    let Some(cname) = std::path::Path::new(path).file_name().and_then(|n| n.to_str()) else { return };
    match scheduler.catalog_store.asset_id_by_cname(cname) {
        Ok(Some(asset_id)) => {
            if let Err(e) = scheduler.catalog_store.set_managed(asset_id, true) {
                error!(cname, error = %e, "failed to mark asset managed after archive");
            }
        }
        Ok(None) => warn!(cname, "archived path has no matching asset"),
        Err(e) => error!(cname, error = %e, "asset lookup failed after archive"),
    }
}

/// Publishes `task` onto whatever queue `route_target` says a task fresh
/// off the scheduler belongs on (rule 1: `router_app_name == "tasks"`
/// always resolves to `task.app_name`).
async fn dispatch(queue: &TaskQueue, task: Task) {
    let target = route_target(&task.app_name, "tasks", sonicat::router::AppType::System);
    if target.is_empty() {
        warn!(task_id = %task.id, app = %task.app_name, "scheduler emitted a task with no route target");
        return;
    }
    if let Err(e) = queue.publish(target, QueueKind::Inbound, &task).await {
        error!(task_id = %task.id, target, error = %e, "failed to publish task");
    }
}

fn build_scheduler(config: &SonicatConfig, catalog_name: &str, catalog_config: &CatalogConfig) -> Result<TasksScheduler> {
    let catalog_dir = config.data_dir("catalog");
    std::fs::create_dir_all(&catalog_dir).context("failed to create catalog data directory")?;
    let catalog_store = CatalogStore::open(catalog_dir.join(format!("{catalog_name}.sqlite")))
        .context("failed to open catalog store")?;

    if let Some((_snapshot, seq)) = load_latest_snapshot::<CatalogReplica>(&config.snapshot.directory, &format!("catalog-{catalog_name}"))
        .context("failed to probe catalog snapshots")?
    {
        info!(catalog = %catalog_name, sequence = seq, "catalog snapshot available for cold-start recovery reference");
    }

    let mut completion_sources: HashMap<String, Box<dyn CompletionSource>> = HashMap::new();
    for apps in catalog_config.tasks.values() {
        for app_name in apps.keys() {
            if completion_sources.contains_key(app_name) {
                continue;
            }
            let store = open_completion_source(config, app_name)?;
            completion_sources.insert(app_name.clone(), store);
        }
    }

    Ok(TasksScheduler::new(
        catalog_name,
        catalog_store,
        completion_sources,
        catalog_config.tasks.clone(),
        catalog_config.path.managed.clone(),
        catalog_config.path.intake.clone(),
        config.tasks.threshold,
        Duration::from_secs(config.tasks.idle_sleep_seconds),
    ))
}

/// Opens the right concrete store for `app_name`, each wrapping a plain
/// `AppDataStore` per `spec.md` §4.6 — `inventory` has no derived-data
/// store of its own (its completion IS the asset existing in the
/// catalog), so it never appears here.
fn open_completion_source(config: &SonicatConfig, app_name: &str) -> Result<Box<dyn CompletionSource>> {
    let path = config.data_dir(match app_name {
        "librosa" => "analysis",
        "path_parser" => "tokens",
        "discogs" | "lastfm" | "rutracker_scraper" => "metadata",
        other => other,
    });
    std::fs::create_dir_all(&path).context("failed to create app-data directory")?;
    let db_path = path.join(format!("{app_name}.sqlite"));

    let store: Box<dyn CompletionSource> = match app_name {
        "librosa" => Box::new(AnalysisStore::open(db_path).context("failed to open analysis store")?),
        "path_parser" => Box::new(TokenStore::open(db_path).context("failed to open tokens store")?),
        "discogs" | "lastfm" | "rutracker_scraper" => {
            Box::new(MetadataStore::open(db_path).context("failed to open metadata store")?)
        }
        _ => Box::new(AppDataStore::open(db_path).context("failed to open app-data store")?),
    };
    Ok(store)
}
