use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Loads the newest valid snapshot whose filename starts with `label-`,
/// skipping any that fail to deserialize (truncated write, bit rot).
/// Returns `None` on a cold start: no directory, no matching files, or
/// every candidate corrupt.
pub fn load_latest_snapshot<T>(snapshot_dir: &Path, label: &str) -> Result<Option<(Snapshot<T>, u64)>>
where
    T: Clone + Serialize + DeserializeOwned,
{
    if !snapshot_dir.exists() {
        info!(directory = %snapshot_dir.display(), "snapshot directory does not exist, starting without snapshot");
        return Ok(None);
    }

    let mut snapshots = list_snapshots(snapshot_dir, label)?;
    if snapshots.is_empty() {
        info!(label, "no snapshots found, starting from beginning");
        return Ok(None);
    }

    snapshots.sort_by(|a, b| b.cmp(a));

    info!(count = snapshots.len(), directory = %snapshot_dir.display(), "attempting to load newest snapshot");

    for path in snapshots {
        match Snapshot::<T>::load_from_file(&path) {
            Ok(snapshot) => {
                let seq = snapshot.sequence_number;
                info!(path = %path.display(), sequence = seq, "loaded snapshot successfully");
                return Ok(Some((snapshot, seq)));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt snapshot, trying next oldest");
                continue;
            }
        }
    }

    error!(label, "all snapshots are corrupt, starting from beginning");
    Ok(None)
}

fn list_snapshots(snapshot_dir: &Path, label: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(snapshot_dir).context("failed to read snapshot directory")?;
    let prefix = format!("{}-", label);
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_directory_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_dir = temp_dir.path().join("nonexistent");
        let result = load_latest_snapshot::<Vec<i32>>(&snapshot_dir, "catalog").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn empty_directory_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_latest_snapshot::<Vec<i32>>(temp_dir.path(), "catalog").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn loads_saved_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = Snapshot::new(vec![1, 2, 3], 100);
        let path = temp_dir.path().join("catalog-20260212T100000.000Z-seq100.json.gz");
        snapshot.save_to_file(&path).unwrap();

        let result = load_latest_snapshot::<Vec<i32>>(temp_dir.path(), "catalog").unwrap();
        assert!(result.is_some());
        let (loaded, seq) = result.unwrap();
        assert_eq!(seq, 100);
        assert_eq!(loaded.payload, vec![1, 2, 3]);
    }

    #[test]
    fn picks_newest() {
        let temp_dir = TempDir::new().unwrap();
        let older = Snapshot::new(vec![1], 50);
        older.save_to_file(&temp_dir.path().join("catalog-20260212T100000.000Z-seq50.json.gz")).unwrap();
        let newer = Snapshot::new(vec![2], 100);
        newer.save_to_file(&temp_dir.path().join("catalog-20260212T110000.000Z-seq100.json.gz")).unwrap();

        let (loaded, seq) = load_latest_snapshot::<Vec<i32>>(temp_dir.path(), "catalog").unwrap().unwrap();
        assert_eq!(seq, 100);
        assert_eq!(loaded.payload, vec![2]);
    }

    #[test]
    fn falls_back_on_corrupt_newest() {
        let temp_dir = TempDir::new().unwrap();
        let older = Snapshot::new(vec![1], 50);
        older.save_to_file(&temp_dir.path().join("catalog-20260212T100000.000Z-seq50.json.gz")).unwrap();
        fs::write(temp_dir.path().join("catalog-20260212T110000.000Z-seq100.json.gz"), b"not a gzip file").unwrap();

        let (loaded, seq) = load_latest_snapshot::<Vec<i32>>(temp_dir.path(), "catalog").unwrap().unwrap();
        assert_eq!(seq, 50);
        assert_eq!(loaded.payload, vec![1]);
    }

    #[test]
    fn all_corrupt_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("catalog-20260212T100000.000Z-seq50.json.gz"), b"invalid").unwrap();
        fs::write(temp_dir.path().join("catalog-20260212T110000.000Z-seq100.json.gz"), b"also invalid").unwrap();

        let result = load_latest_snapshot::<Vec<i32>>(temp_dir.path(), "catalog").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn ignores_snapshots_with_different_label() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = Snapshot::new(vec![1], 100);
        snapshot.save_to_file(&temp_dir.path().join("appdata-discogs-20260212T100000.000Z-seq100.json.gz")).unwrap();

        let result = load_latest_snapshot::<Vec<i32>>(temp_dir.path(), "catalog").unwrap();
        assert!(result.is_none());
    }
}
