//! AppDataStore: the uniform per-worker derived-data contract of
//! `spec.md` §4.6 — `record_result`, `record_failed_search`, `completed`,
//! `failed`, `export_replica`. Per the design note in §9 ("per-worker
//! subclass hierarchy... flattened to a single Worker capability set;
//! variants are data, not types"), there is exactly one `AppDataStore`
//! type; the concrete payload shape for `librosa`/`path_parser`/
//! `discogs`/`lastfm` lives in the sibling `analysis`, `tokens`, and
//! `metadata` submodules, each wrapping a plain `AppDataStore` rather
//! than subclassing it.
//!
//! One store file per worker (`<sonicat_path>/data/{analysis,tokens,
//! metadata}/<worker>.sqlite`), covering every catalog that worker
//! touches — `catalog` is a column, not a file-selector, so `completed`/
//! `failed` are always scoped by the caller's catalog argument.

pub mod analysis;
pub mod metadata;
pub mod tokens;

use crate::error::{Result, SonicatError};
use crate::snapshot::manager::ReplicaSource;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS log (
    id INTEGER PRIMARY KEY,
    catalog TEXT NOT NULL,
    asset_id INTEGER NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE(catalog, asset_id)
);

CREATE TABLE IF NOT EXISTS failedsearch (
    id INTEGER PRIMARY KEY,
    catalog TEXT NOT NULL,
    asset_id INTEGER NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE(catalog, asset_id)
);

CREATE TABLE IF NOT EXISTS result (
    id INTEGER PRIMARY KEY,
    catalog TEXT NOT NULL,
    asset_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_catalog ON log(catalog);
CREATE INDEX IF NOT EXISTS idx_failedsearch_catalog ON failedsearch(catalog);
"#;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppDataReplica {
    pub completed: Vec<(String, i64)>,
    pub failed: Vec<(String, i64)>,
}

pub struct AppDataStore {
    pub(crate) conn: Mutex<Connection>,
}

impl AppDataStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| SonicatError::Schema(format!("cannot open app-data store: {e}")))?;
        conn.execute_batch(BASE_SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("app-data schema mismatch: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SonicatError::Schema(format!("cannot open in-memory app-data store: {e}")))?;
        conn.execute_batch(BASE_SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("app-data schema mismatch: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Appends the worker's primary output and marks the asset complete
    /// for `catalog` in one step — `spec.md` §4.6 treats these as the
    /// same commit (`record_result` is the sole write path that removes
    /// an asset from the next `make_tasks` enumeration). Idempotent:
    /// `failedsearch`/`log` dedupe on `(catalog, asset_id)`, and the
    /// caller is expected to have already deduped its own output rows
    /// (handled per-store in `analysis`/`tokens`/`metadata`).
    pub fn record_result(&self, catalog: &str, asset_id: i64, key: &str, payload: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        let payload_str =
            serde_json::to_string(payload).map_err(|e| SonicatError::External(format!("serialize payload: {e}")))?;
        conn.execute(
            "INSERT INTO result (catalog, asset_id, key, payload) VALUES (?1, ?2, ?3, ?4)",
            params![catalog, asset_id, key, payload_str],
        )
        .map_err(|e| SonicatError::External(format!("result insert failed: {e}")))?;
        conn.execute(
            "INSERT OR IGNORE INTO log (catalog, asset_id) VALUES (?1, ?2)",
            params![catalog, asset_id],
        )
        .map_err(|e| SonicatError::External(format!("log insert failed: {e}")))?;
        Ok(())
    }

    /// Marks `asset_id` complete without a result payload — for workers
    /// like `file_mover` that have no derived data table of their own
    /// but still need a negative filter against re-enumeration. Not used
    /// by the metadata/analysis/tokens stores, which call
    /// `record_result` instead.
    pub fn mark_completed(&self, catalog: &str, asset_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO log (catalog, asset_id) VALUES (?1, ?2)",
            params![catalog, asset_id],
        )
        .map_err(|e| SonicatError::External(format!("log insert failed: {e}")))?;
        Ok(())
    }

    /// Metadata workers only: validation failed for `asset_id` this
    /// catalog — recorded so it is not retried until manually purged.
    pub fn record_failed_search(&self, catalog: &str, asset_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO failedsearch (catalog, asset_id) VALUES (?1, ?2)",
            params![catalog, asset_id],
        )
        .map_err(|e| SonicatError::External(format!("failedsearch insert failed: {e}")))?;
        Ok(())
    }

    pub fn completed(&self, catalog: &str) -> Result<Vec<i64>> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT asset_id FROM log WHERE catalog = ?1 ORDER BY asset_id")
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let ids = stmt
            .query_map(params![catalog], |r| r.get(0))
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        Ok(ids)
    }

    pub fn failed(&self, catalog: &str) -> Result<Vec<i64>> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT asset_id FROM failedsearch WHERE catalog = ?1 ORDER BY asset_id")
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let ids = stmt
            .query_map(params![catalog], |r| r.get(0))
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        Ok(ids)
    }

    /// Manually purges the failed-search ledger for one asset, forcing a
    /// retry at the next `make_tasks` pass — per the open question in
    /// `spec.md` §9, there is no automatic expiry (see `DESIGN.md`).
    pub fn purge_failed(&self, catalog: &str, asset_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "DELETE FROM failedsearch WHERE catalog = ?1 AND asset_id = ?2",
            params![catalog, asset_id],
        )
        .map_err(|e| SonicatError::External(format!("purge failed: {e}")))?;
        Ok(())
    }

    pub fn export_replica(&self) -> Result<AppDataReplica> {
        let conn = self.conn.lock().expect("app-data mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT catalog, asset_id FROM log ORDER BY catalog, asset_id")
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let completed = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        drop(stmt);
        let mut stmt = conn
            .prepare("SELECT catalog, asset_id FROM failedsearch ORDER BY catalog, asset_id")
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let failed = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        Ok(AppDataReplica { completed, failed })
    }
}

impl ReplicaSource<AppDataReplica> for AppDataStore {
    fn replica(&self) -> (AppDataReplica, u64) {
        let replica = self.export_replica().unwrap_or_default();
        let seq = (replica.completed.len() + replica.failed.len()) as u64;
        (replica, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_and_failed_are_independent_negative_filters() {
        let store = AppDataStore::open_in_memory().unwrap();
        store.record_result("samples", 1, "duration", &serde_json::json!(12.3)).unwrap();
        store.record_failed_search("samples", 2).unwrap();
        assert_eq!(store.completed("samples").unwrap(), vec![1]);
        assert_eq!(store.failed("samples").unwrap(), vec![2]);
    }

    #[test]
    fn completed_wins_when_asset_appears_in_both() {
        // Per spec.md §4.1 tie-break: a later success after a prior
        // failed-search attempt still counts as completed for
        // enumeration purposes (completed/failed are independent sets;
        // the scheduler's tie-break lives in the scheduler module, not
        // here — this test only documents that both sets may coexist).
        let store = AppDataStore::open_in_memory().unwrap();
        store.record_failed_search("samples", 1).unwrap();
        store.record_result("samples", 1, "duration", &serde_json::json!(1.0)).unwrap();
        assert_eq!(store.completed("samples").unwrap(), vec![1]);
        assert_eq!(store.failed("samples").unwrap(), vec![1]);
    }

    #[test]
    fn record_result_is_idempotent_on_the_ledger() {
        let store = AppDataStore::open_in_memory().unwrap();
        store.record_result("samples", 1, "duration", &serde_json::json!(1.0)).unwrap();
        store.record_result("samples", 1, "tempo", &serde_json::json!(128.0)).unwrap();
        assert_eq!(store.completed("samples").unwrap(), vec![1]);
    }

    #[test]
    fn purge_failed_forces_retry() {
        let store = AppDataStore::open_in_memory().unwrap();
        store.record_failed_search("samples", 1).unwrap();
        store.purge_failed("samples", 1).unwrap();
        assert!(store.failed("samples").unwrap().is_empty());
    }

    #[test]
    fn catalogs_are_isolated() {
        let store = AppDataStore::open_in_memory().unwrap();
        store.record_result("samples", 1, "duration", &serde_json::json!(1.0)).unwrap();
        store.record_result("loops", 1, "duration", &serde_json::json!(1.0)).unwrap();
        assert_eq!(store.completed("samples").unwrap(), vec![1]);
        assert_eq!(store.completed("loops").unwrap(), vec![1]);
    }
}
