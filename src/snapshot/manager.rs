use crate::snapshot::{config::SnapshotConfig, Snapshot};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};


/// Anything that can produce a point-in-time export of its own data plus
/// a monotonically increasing sequence number (the CatalogStore's asset
/// count, an AppDataStore's row count, anything that only grows between
/// snapshots works as a cheap staleness marker).
pub trait ReplicaSource<T>: Send + Sync {
    fn replica(&self) -> (T, u64);
}

/// Periodically exports one store's replica to a gzip'd JSON snapshot and
/// prunes old ones. One `SnapshotManager` runs per store per process.
pub struct SnapshotManager<T, S: ReplicaSource<T>> {
    source: Arc<S>,
    config: SnapshotConfig,
    label: String,
    _marker: std::marker::PhantomData<T>,
}

impl<T, S> SnapshotManager<T, S>
where
    T: Clone + Serialize + DeserializeOwned,
    S: ReplicaSource<T>,
{
    pub fn new(source: Arc<S>, config: SnapshotConfig, label: impl Into<String>) -> Self {
        Self {
            source,
            config,
            label: label.into(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Runs until cancelled. A no-op when the config disables snapshots.
    pub async fn run_snapshot_loop(&self) -> Result<()> {
        if !self.config.enabled {
            info!(label = %self.label, "snapshot manager disabled, exiting loop");
            return Ok(());
        }

        info!(
            label = %self.label,
            interval_minutes = self.config.interval_minutes,
            directory = %self.config.directory.display(),
            keep_count = self.config.keep_count,
            "starting snapshot manager"
        );

        fs::create_dir_all(&self.config.directory).context("failed to create snapshot directory")?;

        let mut timer = interval(Duration::from_secs(self.config.interval_minutes * 60));

        loop {
            timer.tick().await;
            if let Err(e) = self.create_and_save_snapshot() {
                error!(label = %self.label, error = %e, "failed to create snapshot");
            }
        }
    }

    fn create_and_save_snapshot(&self) -> Result<()> {
        let (payload, sequence) = self.source.replica();
        let snapshot = Snapshot::new(payload, sequence);

        let path = self.snapshot_path(sequence);
        snapshot.save_to_file(&path)?;

        info!(label = %self.label, sequence, path = %path.display(), "snapshot saved");

        self.cleanup_old_snapshots()?;
        Ok(())
    }

    fn snapshot_path(&self, sequence: u64) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let filename = format!("{}-{}-seq{}.json.gz", self.label, timestamp, sequence);
        self.config.directory.join(filename)
    }

    fn cleanup_old_snapshots(&self) -> Result<()> {
        let mut snapshots = self.list_snapshots()?;
        if snapshots.len() <= self.config.keep_count {
            return Ok(());
        }
        snapshots.sort();
        let delete_count = snapshots.len() - self.config.keep_count;
        for path in &snapshots[..delete_count] {
            if let Err(e) = fs::remove_file(path) {
                error!(error = %e, path = %path.display(), "failed to delete old snapshot");
            } else {
                info!(path = %path.display(), "deleted old snapshot");
            }
        }
        Ok(())
    }

    fn list_snapshots(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.config.directory).context("failed to read snapshot directory")?;
        let prefix = format!("{}-", self.label);
        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.context("failed to read directory entry")?;
            let path = entry.path();
            if path.is_file() {
                if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                    if filename.starts_with(&prefix) && (filename.ends_with(".json.gz") || filename.ends_with(".json")) {
                        snapshots.push(path);
                    }
                }
            }
        }
        Ok(snapshots)
    }
}
