//! `discogs`/`lastfm` AppDataStore: one instantiation per metadata API,
//! storing the accepted release match (`spec.md` §4.4) plus its track
//! list, genre/style tags, and media formats. `tag`/`format` are
//! lazily-cached id lookups (`DashMap`), the same pattern the original
//! uses in both `interfaces/api/Discogs.py` and `interfaces/api/
//! LastFM.py` to avoid duplicate dimension rows — carried uniformly to
//! every metadata store per `SPEC_FULL.md` §4.6.

use crate::appdata::AppDataStore;
use crate::error::{Result, SonicatError};
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS release (
    id INTEGER PRIMARY KEY,
    catalog TEXT NOT NULL,
    asset_id INTEGER NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    UNIQUE(catalog, asset_id)
);

CREATE TABLE IF NOT EXISTS trackresult (
    id INTEGER PRIMARY KEY,
    release_id INTEGER NOT NULL REFERENCES release(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    duration_seconds REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS tag (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS format (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS releasetag (
    release_id INTEGER NOT NULL REFERENCES release(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tag(id),
    UNIQUE(release_id, tag_id)
);

CREATE TABLE IF NOT EXISTS releaseformat (
    release_id INTEGER NOT NULL REFERENCES release(id) ON DELETE CASCADE,
    format_id INTEGER NOT NULL REFERENCES format(id),
    UNIQUE(release_id, format_id)
);
"#;

/// A candidate release as matched against measured track durations.
/// Serializable so a metadata worker can carry one home as a Task result
/// payload for `app_data` to record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleaseMatch {
    pub external_id: String,
    pub title: String,
    pub tracks: Vec<f64>,
    pub tags: Vec<String>,
    pub formats: Vec<String>,
}

pub struct MetadataStore {
    inner: AppDataStore,
    tag_ids: DashMap<String, i64>,
    format_ids: DashMap<String, i64>,
}

impl MetadataStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = AppDataStore::open(path)?;
        store
            .conn
            .lock()
            .expect("app-data mutex poisoned")
            .execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("metadata schema mismatch: {e}")))?;
        Ok(Self { inner: store, tag_ids: DashMap::new(), format_ids: DashMap::new() })
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = AppDataStore::open_in_memory()?;
        store
            .conn
            .lock()
            .expect("app-data mutex poisoned")
            .execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("metadata schema mismatch: {e}")))?;
        Ok(Self { inner: store, tag_ids: DashMap::new(), format_ids: DashMap::new() })
    }

    pub fn inner(&self) -> &AppDataStore {
        &self.inner
    }

    fn dimension_id(cache: &DashMap<String, i64>, conn: &rusqlite::Connection, table: &str, name: &str) -> Result<i64> {
        if let Some(id) = cache.get(name) {
            return Ok(*id);
        }
        let existing: Option<i64> = conn
            .query_row(&format!("SELECT id FROM {table} WHERE name = ?1"), params![name], |r| r.get(0))
            .optional()
            .map_err(|e| SonicatError::External(format!("{table} lookup failed: {e}")))?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute(&format!("INSERT INTO {table} (name) VALUES (?1)"), params![name])
                    .map_err(|e| SonicatError::External(format!("{table} insert failed: {e}")))?;
                conn.last_insert_rowid()
            }
        };
        cache.insert(name.to_string(), id);
        Ok(id)
    }

    /// Records an accepted match: release row, per-track durations, and
    /// tag/format associations via the lazy dimension caches, then marks
    /// the asset complete for `catalog`.
    pub fn record_match(&self, catalog: &str, asset_id: i64, m: &ReleaseMatch) -> Result<()> {
        let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO release (catalog, asset_id, external_id, title) VALUES (?1, ?2, ?3, ?4)",
            params![catalog, asset_id, m.external_id, m.title],
        )
        .map_err(|e| SonicatError::External(format!("release insert failed: {e}")))?;
        let release_id = conn.last_insert_rowid();

        for (position, duration) in m.tracks.iter().enumerate() {
            conn.execute(
                "INSERT INTO trackresult (release_id, position, duration_seconds) VALUES (?1, ?2, ?3)",
                params![release_id, position as i64 + 1, duration],
            )
            .map_err(|e| SonicatError::External(format!("trackresult insert failed: {e}")))?;
        }

        for tag in &m.tags {
            let tag_id = Self::dimension_id(&self.tag_ids, &conn, "tag", tag)?;
            conn.execute(
                "INSERT OR IGNORE INTO releasetag (release_id, tag_id) VALUES (?1, ?2)",
                params![release_id, tag_id],
            )
            .map_err(|e| SonicatError::External(format!("releasetag insert failed: {e}")))?;
        }
        for format in &m.formats {
            let format_id = Self::dimension_id(&self.format_ids, &conn, "format", format)?;
            conn.execute(
                "INSERT OR IGNORE INTO releaseformat (release_id, format_id) VALUES (?1, ?2)",
                params![release_id, format_id],
            )
            .map_err(|e| SonicatError::External(format!("releaseformat insert failed: {e}")))?;
        }
        drop(conn);
        self.inner.mark_completed(catalog, asset_id)
    }
}

/// Progressively broader query argument sets tried in order, per
/// `spec.md` §4.4: `[{artist}, {publisher}, {}, {artist,year},
/// {publisher,year}]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryArgs {
    pub artist: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<u32>,
}

pub fn query_variants(label: &str, year: Option<u32>) -> Vec<QueryArgs> {
    vec![
        QueryArgs { artist: Some(label.to_string()), publisher: None, year: None },
        QueryArgs { artist: None, publisher: Some(label.to_string()), year: None },
        QueryArgs::default(),
        QueryArgs { artist: Some(label.to_string()), publisher: None, year },
        QueryArgs { artist: None, publisher: Some(label.to_string()), year },
    ]
}

/// Accepts a candidate release iff track counts match and every
/// measured duration lies within +/-2s of the candidate's, per
/// `spec.md` §8's literal validation scenario.
pub fn validate_duration_match(measured: &[f64], candidate: &[f64]) -> bool {
    measured.len() == candidate.len()
        && measured.iter().zip(candidate.iter()).all(|(m, c)| (m - c).abs() <= 2.0)
}

impl crate::scheduler::CompletionSource for MetadataStore {
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
    fn records_match_with_tracks_tags_and_formats() {
        let store = MetadataStore::open_in_memory().unwrap();
        let m = ReleaseMatch {
            external_id: "123".into(),
            title: "Pack Vol 1".into(),
            tracks: vec![212.0, 198.5, 240.1],
            tags: vec!["techno".into(), "electronic".into()],
            formats: vec!["CD".into()],
        };
        store.record_match("samples", 1, &m).unwrap();
        assert_eq!(store.inner().completed("samples").unwrap(), vec![1]);
    }

    #[test]
    fn tag_dimension_is_reused_across_releases() {
        let store = MetadataStore::open_in_memory().unwrap();
        let m1 = ReleaseMatch { external_id: "1".into(), title: "A".into(), tracks: vec![1.0], tags: vec!["techno".into()], formats: vec![] };
        let m2 = ReleaseMatch { external_id: "2".into(), title: "B".into(), tracks: vec![1.0], tags: vec!["techno".into()], formats: vec![] };
        store.record_match("samples", 1, &m1).unwrap();
        store.record_match("samples", 2, &m2).unwrap();
        assert_eq!(store.tag_ids.len(), 1);
    }

    #[test]
    fn validation_accepts_within_tolerance() {
        assert!(validate_duration_match(&[212.0, 198.5, 240.1], &[213.0, 199.0, 240.0]));
    }

    #[test]
    fn validation_rejects_outside_tolerance() {
        assert!(!validate_duration_match(&[212.0, 198.5, 235.0], &[213.0, 199.0, 240.0]));
    }

    #[test]
    fn validation_rejects_track_count_mismatch() {
        assert!(!validate_duration_match(&[212.0, 198.5], &[213.0, 199.0, 240.0]));
    }

    #[test]
    fn query_variants_are_in_progressively_broader_order() {
        let variants = query_variants("Acme Sounds", Some(2026));
        assert_eq!(variants.len(), 5);
        assert_eq!(variants[0].artist.as_deref(), Some("Acme Sounds"));
        assert_eq!(variants[1].publisher.as_deref(), Some("Acme Sounds"));
        assert_eq!(variants[2], QueryArgs::default());
        assert_eq!(variants[3].year, Some(2026));
        assert_eq!(variants[4].publisher.as_deref(), Some("Acme Sounds"));
    }
}
