//! `librosa` AppDataStore: AudioData facts per `spec.md` §3 — one row per
//! `(file_id, catalog, dtype)`, `dtype` one of {duration, tempo,
//! chroma_distribution, beat_frames}, exactly one of `value`/`path`/
//! `foreign_key` populated per `spec.md` §6. `chroma_distribution` points
//! at a side-table row (`ChromaDistribution`, 12 real-valued channels).

use crate::appdata::AppDataStore;
use crate::error::{Result, SonicatError};
use rusqlite::{params, OptionalExtension};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audiodata (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL,
    catalog TEXT NOT NULL,
    dtype TEXT NOT NULL,
    datavalue REAL,
    datafilepath TEXT,
    dataforeignkey INTEGER,
    UNIQUE(file_id, catalog, dtype)
);

CREATE TABLE IF NOT EXISTS chromadistribution (
    id INTEGER PRIMARY KEY,
    c0 REAL NOT NULL, c1 REAL NOT NULL, c2 REAL NOT NULL, c3 REAL NOT NULL,
    c4 REAL NOT NULL, c5 REAL NOT NULL, c6 REAL NOT NULL, c7 REAL NOT NULL,
    c8 REAL NOT NULL, c9 REAL NOT NULL, c10 REAL NOT NULL, c11 REAL NOT NULL
);
"#;

/// A 12-channel chroma distribution, a chromagram's column-sum / total
/// reduction (`spec.md` §4.4 `librosa.basic`).
pub type ChromaDistribution = [f64; 12];

pub struct AnalysisStore {
    inner: AppDataStore,
}

impl AnalysisStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = AppDataStore::open(path)?;
        store
            .conn
            .lock()
            .expect("app-data mutex poisoned")
            .execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("analysis schema mismatch: {e}")))?;
        Ok(Self { inner: store })
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = AppDataStore::open_in_memory()?;
        store
            .conn
            .lock()
            .expect("app-data mutex poisoned")
            .execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("analysis schema mismatch: {e}")))?;
        Ok(Self { inner: store })
    }

    pub fn inner(&self) -> &AppDataStore {
        &self.inner
    }

    /// Records a scalar fact (`duration`, `tempo`) and marks the asset's
    /// ledger entry in the same call — the asset's completion is judged
    /// per-asset, not per-file, so the caller is responsible for calling
    /// this once all of an asset's files have been recorded and only
    /// then relying on `completed()`.
    pub fn record_scalar(&self, catalog: &str, asset_id: i64, file_id: i64, dtype: &str, value: f64) -> Result<()> {
        let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO audiodata (file_id, catalog, dtype, datavalue) VALUES (?1, ?2, ?3, ?4)",
            params![file_id, catalog, dtype, value],
        )
        .map_err(|e| SonicatError::External(format!("audiodata insert failed: {e}")))?;
        drop(conn);
        self.inner.mark_completed(catalog, asset_id)
    }

    /// Records a bulky array (`beat_frames`) as a relative path into the
    /// feature-artifact tree rather than inline.
    pub fn record_artifact_path(
        &self,
        catalog: &str,
        asset_id: i64,
        file_id: i64,
        dtype: &str,
        path: &str,
    ) -> Result<()> {
        let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO audiodata (file_id, catalog, dtype, datafilepath) VALUES (?1, ?2, ?3, ?4)",
            params![file_id, catalog, dtype, path],
        )
        .map_err(|e| SonicatError::External(format!("audiodata insert failed: {e}")))?;
        drop(conn);
        self.inner.mark_completed(catalog, asset_id)
    }

    /// Records a chroma distribution: inserts the 12-channel side-table
    /// row, then an `audiodata` row pointing at it by foreign key.
    pub fn record_chroma(
        &self,
        catalog: &str,
        asset_id: i64,
        file_id: i64,
        distribution: ChromaDistribution,
    ) -> Result<()> {
        let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "INSERT INTO chromadistribution (c0,c1,c2,c3,c4,c5,c6,c7,c8,c9,c10,c11)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                distribution[0], distribution[1], distribution[2], distribution[3],
                distribution[4], distribution[5], distribution[6], distribution[7],
                distribution[8], distribution[9], distribution[10], distribution[11],
            ],
        )
        .map_err(|e| SonicatError::External(format!("chromadistribution insert failed: {e}")))?;
        let chroma_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT OR REPLACE INTO audiodata (file_id, catalog, dtype, dataforeignkey) VALUES (?1, ?2, 'chroma_distribution', ?3)",
            params![file_id, catalog, chroma_id],
        )
        .map_err(|e| SonicatError::External(format!("audiodata insert failed: {e}")))?;
        drop(conn);
        self.inner.mark_completed(catalog, asset_id)
    }

    /// Looks up the recorded `duration` scalar for one file, used by the
    /// metadata workers (`discogs`/`lastfm`/`rutracker_scraper`) to build
    /// the measured-duration vector `find_best_match` validates against —
    /// the one place a metadata worker reads out of a store it does not
    /// own the write handle for (read-only query, never a write).
    pub fn duration_for_file(&self, catalog: &str, file_id: i64) -> Result<Option<f64>> {
        let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
        conn.query_row(
            "SELECT datavalue FROM audiodata WHERE file_id = ?1 AND catalog = ?2 AND dtype = 'duration'",
            params![file_id, catalog],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| SonicatError::External(format!("duration lookup failed: {e}")))
    }

    /// Reduces a chromagram (12 x N matrix, values hard-thresholded
    /// below 1.0 to 0 by the caller in `librosa.basic`) to a 12-channel
    /// distribution: column-sum per channel divided by the grand total.
    /// A silent frame (all-zero matrix) yields a uniform distribution
    /// rather than dividing by zero.
    pub fn reduce_chromagram(chromagram: &[[f64; 12]]) -> ChromaDistribution {
        let mut sums = [0.0f64; 12];
        for frame in chromagram {
            for (i, v) in frame.iter().enumerate() {
                sums[i] += v;
            }
        }
        let total: f64 = sums.iter().sum();
        if total <= 0.0 {
            return [1.0 / 12.0; 12];
        }
        let mut out = [0.0f64; 12];
        for i in 0..12 {
            out[i] = sums[i] / total;
        }
        out
    }
}

impl crate::scheduler::CompletionSource for AnalysisStore {
    fn completed(&self, catalog: &str) -> Result<Vec<i64>> {
        self.inner().completed(catalog)
    }
    fn failed(&self, catalog: &str) -> Result<Vec<i64>> {
        self.inner().failed(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_duration_and_marks_completed() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.record_scalar("samples", 1, 10, "duration", 212.0).unwrap();
        assert_eq!(store.inner().completed("samples").unwrap(), vec![1]);
    }

    #[test]
    fn duration_lookup_is_scoped_by_catalog() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.record_scalar("samples", 1, 10, "duration", 212.0).unwrap();
        assert_eq!(store.duration_for_file("samples", 10).unwrap(), Some(212.0));
        assert_eq!(store.duration_for_file("loops", 10).unwrap(), None);
        assert_eq!(store.duration_for_file("samples", 999).unwrap(), None);
    }

    #[test]
    fn chroma_round_trips_through_side_table() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.record_chroma("samples", 1, 10, [1.0 / 12.0; 12]).unwrap();
        assert_eq!(store.inner().completed("samples").unwrap(), vec![1]);
    }

    #[test]
    fn reduce_chromagram_normalizes_to_one() {
        let chromagram = vec![[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]; 4];
        let dist = AnalysisStore::reduce_chromagram(&chromagram);
        assert!((dist[0] - 1.0).abs() < 1e-9);
        assert!(dist[1..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn reduce_chromagram_handles_silence() {
        let chromagram = vec![[0.0; 12]; 4];
        let dist = AnalysisStore::reduce_chromagram(&chromagram);
        let sum: f64 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
