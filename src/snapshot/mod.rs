//! Gzip-compressed JSON replica snapshots, generic over payload type.
//!
//! `CatalogStore::export_replica` and `AppDataStore::export_replica` both
//! produce a `Snapshot<T>` for some `T: Serialize`; this module only knows
//! how to write one to disk atomically and read the newest valid one back.
//! Adapted from the teacher's entity-specific snapshot module.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

pub mod config;
pub mod manager;
pub mod recovery;

#[cfg(test)]
mod tests;

/// A point-in-time export of one store's data, as the pack-wide replica
/// format (§6 of the original scheduler spec): gzip'd JSON with a version
/// tag and sequence number for newest-wins ordering on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub snapshot_version: String,
    pub created_at: DateTime<Utc>,
    pub sequence_number: u64,
    pub payload: T,
}

impl<T: Clone + Serialize + DeserializeOwned> Snapshot<T> {
    pub fn new(payload: T, sequence_number: u64) -> Self {
        Self {
            snapshot_version: "1".to_string(),
            created_at: Utc::now(),
            sequence_number,
            payload,
        }
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Writes compressed JSON via a temp-file-then-rename, fsync'd before
    /// the rename so a crash never leaves a half-written snapshot visible
    /// under the final name.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize snapshot to JSON")?;

        let tmp_path = path.with_extension("tmp");
        {
            let tmp_file = File::create(&tmp_path).context("failed to create temporary snapshot file")?;
            let mut encoder = GzEncoder::new(tmp_file, Compression::default());
            encoder.write_all(json.as_bytes()).context("failed to write compressed snapshot data")?;
            let file = encoder.finish().context("failed to finish compression")?;
            file.sync_all().context("failed to sync snapshot file to disk")?;
        }
        fs::rename(&tmp_path, path).context("failed to rename temporary snapshot file")?;
        Ok(())
    }

    /// Reads a `.json.gz` snapshot, falling back to uncompressed `.json`
    /// for snapshots written before gzip was adopted.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).context("failed to open snapshot file")?;
        let is_compressed = path.extension().and_then(|ext| ext.to_str()).map(|ext| ext == "gz").unwrap_or(false);

        let snapshot = if is_compressed {
            let mut decoder = GzDecoder::new(file);
            let mut json = String::new();
            decoder.read_to_string(&mut json).context("failed to decompress snapshot file")?;
            serde_json::from_str(&json).context("failed to deserialize snapshot JSON")?
        } else {
            let mut json = String::new();
            let mut file = file;
            file.read_to_string(&mut json).context("failed to read snapshot file")?;
            serde_json::from_str(&json).context("failed to deserialize snapshot JSON")?
        };

        Ok(snapshot)
    }
}
