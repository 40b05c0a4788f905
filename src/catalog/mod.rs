//! The CatalogStore: the authoritative mapping of assets to files, per
//! `spec.md` §4.5. One store per catalog, backed by a single `rusqlite`
//! file at `<sonicat_path>/data/catalog/<catalog>.sqlite`.
//!
//! Schema is `IF NOT EXISTS` SQL DDL, ported from
//! `original_source/interfaces/database/Catalog.py`'s `SCHEMA` list, with
//! the non-obvious rules from `spec.md` §6: `file.filetype` nullable,
//! `asset.managed` an integer 0/1, `(asset, dirname, basename)` unique.
//!
//! Write access is held only by the `catalog_intake` and `app_data`
//! workers (`spec.md` §4.5/§2); this module does not itself enforce that
//! — it is a property of which binaries hold a non-replica `CatalogStore`.

use crate::error::{Result, SonicatError};
use crate::name::{label_dir_from_cname, name_is_canonical};
use crate::snapshot::manager::ReplicaSource;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS label (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    label_dir TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS filetype (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS asset (
    id INTEGER PRIMARY KEY,
    cname TEXT NOT NULL UNIQUE,
    label_id INTEGER NOT NULL REFERENCES label(id),
    managed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS file (
    id INTEGER PRIMARY KEY,
    asset_id INTEGER NOT NULL REFERENCES asset(id) ON DELETE CASCADE,
    dirname TEXT NOT NULL,
    basename TEXT NOT NULL,
    size INTEGER NOT NULL,
    filetype_id INTEGER REFERENCES filetype(id),
    digest TEXT,
    UNIQUE(asset_id, dirname, basename)
);

CREATE INDEX IF NOT EXISTS idx_file_asset ON file(asset_id);
CREATE INDEX IF NOT EXISTS idx_asset_label ON asset(label_id);
"#;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssetRecord {
    pub id: i64,
    pub cname: String,
    pub label: String,
    pub managed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub asset_id: i64,
    pub dirname: String,
    pub basename: String,
    pub size: i64,
    pub filetype: Option<String>,
}

/// Gzip'd JSON replica payload exported by `export_replica` (consumed by
/// read-only workers per `spec.md` §4.4's `load_catalog_replicas`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogReplica {
    pub assets: Vec<AssetRecord>,
    pub files: Vec<FileRecord>,
}

/// Lazily-populated, invalidate-on-write lookup caches, per `spec.md`
/// §4.5: `{filetype_name -> id}`, `{label_name -> id}`, `{asset_id ->
/// cname}` — shaped like the teacher's `NamespaceRegistry` triple-index.
#[derive(Default)]
struct Caches {
    filetype_ids: DashMap<String, i64>,
    label_ids: DashMap<String, i64>,
    asset_cnames: DashMap<i64, String>,
}

pub struct CatalogStore {
    conn: Mutex<Connection>,
    caches: Caches,
    read_only: bool,
}

impl CatalogStore {
    /// Opens (creating if absent) the writable catalog database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| SonicatError::Schema(format!("cannot open catalog store: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("catalog schema mismatch: {e}")))?;
        Ok(Self { conn: Mutex::new(conn), caches: Caches::default(), read_only: false })
    }

    /// Opens a filesystem-copy read-replica, per `spec.md` §4.4
    /// `load_catalog_replicas` — read-only snapshots taken at a quiescent
    /// point; workers never write through this handle.
    pub fn open_replica(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(path.as_ref(), rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| SonicatError::Schema(format!("cannot open catalog replica: {e}")))?;
        Ok(Self { conn: Mutex::new(conn), caches: Caches::default(), read_only: true })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SonicatError::Schema(format!("cannot open in-memory catalog: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("catalog schema mismatch: {e}")))?;
        Ok(Self { conn: Mutex::new(conn), caches: Caches::default(), read_only: false })
    }

    fn assert_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(SonicatError::InvariantViolation("attempted write through a read replica".into()));
        }
        Ok(())
    }

    /// Returns the cached id for `label_dir`, inserting the label (using
    /// `label_dir` itself as the display name when inserting fresh) if
    /// absent. Invalidates nothing — insertion only grows the cache.
    fn label_id(&self, conn: &Connection, name: &str, label_dir: &str) -> Result<i64> {
        if let Some(id) = self.caches.label_ids.get(label_dir) {
            return Ok(*id);
        }
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM label WHERE label_dir = ?1", params![label_dir], |r| r.get(0))
            .optional()
            .map_err(|e| SonicatError::External(format!("label lookup failed: {e}")))?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO label (name, label_dir) VALUES (?1, ?2)", params![name, label_dir])
                    .map_err(|e| SonicatError::External(format!("label insert failed: {e}")))?;
                conn.last_insert_rowid()
            }
        };
        self.caches.label_ids.insert(label_dir.to_string(), id);
        Ok(id)
    }

    fn filetype_id(&self, conn: &Connection, name: &str) -> Result<Option<i64>> {
        if name.is_empty() {
            return Ok(None);
        }
        let name = name.to_lowercase();
        if let Some(id) = self.caches.filetype_ids.get(&name) {
            return Ok(Some(*id));
        }
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM filetype WHERE name = ?1", params![name], |r| r.get(0))
            .optional()
            .map_err(|e| SonicatError::External(format!("filetype lookup failed: {e}")))?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO filetype (name) VALUES (?1)", params![name])
                    .map_err(|e| SonicatError::External(format!("filetype insert failed: {e}")))?;
                conn.last_insert_rowid()
            }
        };
        self.caches.filetype_ids.insert(name, id);
        Ok(Some(id))
    }

    /// Inserts a new asset and its files in a single transaction that
    /// either fully commits or leaves the store unchanged, per
    /// `spec.md` §4.5. `managed` reflects whether an archive exists yet
    /// (false for a catalog-only record, set true once `file_mover`
    /// archives the asset).
    pub fn insert_asset(&self, cname: &str, managed: bool, files: &[(String, String, i64, String)]) -> Result<i64> {
        self.assert_writable()?;
        if !name_is_canonical(cname) {
            return Err(SonicatError::Validation(format!("'{cname}' is not a canonical name")));
        }
        let label_dir = label_dir_from_cname(cname);
        let label_name = cname.split(" - ").next().unwrap_or(cname).to_string();

        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction().map_err(|e| SonicatError::External(format!("begin transaction: {e}")))?;

        let label_id = self.label_id(&tx, &label_name, &label_dir)?;

        tx.execute(
            "INSERT INTO asset (cname, label_id, managed) VALUES (?1, ?2, ?3)",
            params![cname, label_id, managed as i64],
        )
        .map_err(|e| SonicatError::Validation(format!("asset '{cname}' already exists or is invalid: {e}")))?;
        let asset_id = tx.last_insert_rowid();

        for (dirname, basename, size, ext) in files {
            let filetype_id = self.filetype_id(&tx, ext)?;
            tx.execute(
                "INSERT INTO file (asset_id, dirname, basename, size, filetype_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![asset_id, dirname, basename, size, filetype_id],
            )
            .map_err(|e| SonicatError::External(format!("file insert failed: {e}")))?;
        }

        if files.is_empty() {
            return Err(SonicatError::InvariantViolation(format!(
                "intake of '{cname}' produced zero files after a passing precheck"
            )));
        }

        tx.commit().map_err(|e| SonicatError::External(format!("commit failed: {e}")))?;
        self.caches.asset_cnames.insert(asset_id, cname.to_string());
        Ok(asset_id)
    }

    /// Appends newly-discovered files to an existing asset (the
    /// `inventory` -> `app_data` continuation re-surveys a managed
    /// asset without re-running `insert_asset`).
    pub fn append_files(&self, asset_id: i64, files: &[(String, String, i64, String)]) -> Result<()> {
        self.assert_writable()?;
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction().map_err(|e| SonicatError::External(format!("begin transaction: {e}")))?;
        for (dirname, basename, size, ext) in files {
            let filetype_id = self.filetype_id(&tx, ext)?;
            tx.execute(
                "INSERT OR IGNORE INTO file (asset_id, dirname, basename, size, filetype_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![asset_id, dirname, basename, size, filetype_id],
            )
            .map_err(|e| SonicatError::External(format!("file insert failed: {e}")))?;
        }
        tx.commit().map_err(|e| SonicatError::External(format!("commit failed: {e}")))?;
        Ok(())
    }

    pub fn set_managed(&self, asset_id: i64, managed: bool) -> Result<()> {
        self.assert_writable()?;
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute("UPDATE asset SET managed = ?1 WHERE id = ?2", params![managed as i64, asset_id])
            .map_err(|e| SonicatError::External(format!("managed flag update failed: {e}")))?;
        Ok(())
    }

    pub fn all_asset_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT id FROM asset ORDER BY id")
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let ids = stmt
            .query_map([], |r| r.get(0))
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        Ok(ids)
    }

    pub fn cname(&self, asset_id: i64) -> Result<Option<String>> {
        if let Some(cname) = self.caches.asset_cnames.get(&asset_id) {
            return Ok(Some(cname.clone()));
        }
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let cname: Option<String> = conn
            .query_row("SELECT cname FROM asset WHERE id = ?1", params![asset_id], |r| r.get(0))
            .optional()
            .map_err(|e| SonicatError::External(format!("cname lookup failed: {e}")))?;
        if let Some(ref c) = cname {
            self.caches.asset_cnames.insert(asset_id, c.clone());
        }
        Ok(cname)
    }

    /// Looks up an asset id by its cname — the inverse of `cname()`,
    /// used by the `app_data`/`tasks` write path to resolve a completed
    /// `file_mover.archive` task (which only carries a filesystem path)
    /// back to the asset it belongs to.
    pub fn asset_id_by_cname(&self, cname: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.query_row("SELECT id FROM asset WHERE cname = ?1", params![cname], |r| r.get(0))
            .optional()
            .map_err(|e| SonicatError::External(format!("asset lookup failed: {e}")))
    }

    pub fn is_managed(&self, asset_id: i64) -> Result<bool> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let managed: i64 = conn
            .query_row("SELECT managed FROM asset WHERE id = ?1", params![asset_id], |r| r.get(0))
            .map_err(|e| SonicatError::External(format!("managed lookup failed: {e}")))?;
        Ok(managed != 0)
    }

    /// Files belonging to one asset, optionally restricted to a set of
    /// lowercased extensions (the filter analysis/path-parsing workers
    /// apply before a Task is enriched, per `spec.md` §4.1 step 4).
    pub fn files_by_asset(&self, asset_id: i64, filetypes: Option<&[&str]>) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT file.id, file.asset_id, file.dirname, file.basename, file.size, filetype.name
                 FROM file LEFT JOIN filetype ON file.filetype_id = filetype.id
                 WHERE file.asset_id = ?1 ORDER BY file.id",
            )
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let rows = stmt
            .query_map(params![asset_id], |r| {
                Ok(FileRecord {
                    id: r.get(0)?,
                    asset_id: r.get(1)?,
                    dirname: r.get(2)?,
                    basename: r.get(3)?,
                    size: r.get(4)?,
                    filetype: r.get(5)?,
                })
            })
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        Ok(match filetypes {
            None => rows,
            Some(wanted) => rows
                .into_iter()
                .filter(|f| f.filetype.as_deref().map(|ft| wanted.contains(&ft)).unwrap_or(false))
                .collect(),
        })
    }

    /// Removes an asset and cascades to its files (the only path that
    /// deletes Asset rows, per `spec.md` §3).
    pub fn purge_asset(&self, asset_id: i64) -> Result<()> {
        self.assert_writable()?;
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute("DELETE FROM asset WHERE id = ?1", params![asset_id])
            .map_err(|e| SonicatError::External(format!("purge failed: {e}")))?;
        self.caches.asset_cnames.remove(&asset_id);
        Ok(())
    }

    pub fn export_replica(&self) -> Result<CatalogReplica> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT asset.id, asset.cname, label.name, asset.managed
                 FROM asset JOIN label ON asset.label_id = label.id ORDER BY asset.id",
            )
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let assets = stmt
            .query_map([], |r| {
                Ok(AssetRecord { id: r.get(0)?, cname: r.get(1)?, label: r.get(2)?, managed: r.get::<_, i64>(3)? != 0 })
            })
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;
        drop(stmt);

        let mut stmt = conn
            .prepare(
                "SELECT file.id, file.asset_id, file.dirname, file.basename, file.size, filetype.name
                 FROM file LEFT JOIN filetype ON file.filetype_id = filetype.id ORDER BY file.id",
            )
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?;
        let files = stmt
            .query_map([], |r| {
                Ok(FileRecord {
                    id: r.get(0)?,
                    asset_id: r.get(1)?,
                    dirname: r.get(2)?,
                    basename: r.get(3)?,
                    size: r.get(4)?,
                    filetype: r.get(5)?,
                })
            })
            .map_err(|e| SonicatError::External(format!("query failed: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SonicatError::External(format!("row read failed: {e}")))?;

        Ok(CatalogReplica { assets, files })
    }
}

/// `(replica payload, sequence number)` for `SnapshotManager` — asset
/// count only grows between snapshots, a cheap monotonic staleness
/// marker per the teacher's `ReplicaSource` contract.
impl ReplicaSource<CatalogReplica> for CatalogStore {
    fn replica(&self) -> (CatalogReplica, u64) {
        let replica = self.export_replica().unwrap_or_default();
        let seq = replica.assets.len() as u64;
        (replica, seq)
    }
}
