//! `path_parser` AppDataStore: `Token`/`FilePathToken` per `spec.md` §3 —
//! `Token` is the unique token string, `FilePathToken` the (file,
//! catalog, token) membership produced by a path parse.

use crate::appdata::AppDataStore;
use crate::error::{Result, SonicatError};
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS token (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS filepathtoken (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL,
    catalog TEXT NOT NULL,
    token_id INTEGER NOT NULL REFERENCES token(id),
    UNIQUE(file_id, catalog, token_id)
);
"#;

pub struct TokenStore {
    inner: AppDataStore,
    token_ids: DashMap<String, i64>,
}

impl TokenStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = AppDataStore::open(path)?;
        store
            .conn
            .lock()
            .expect("app-data mutex poisoned")
            .execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("tokens schema mismatch: {e}")))?;
        Ok(Self { inner: store, token_ids: DashMap::new() })
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = AppDataStore::open_in_memory()?;
        store
            .conn
            .lock()
            .expect("app-data mutex poisoned")
            .execute_batch(SCHEMA)
            .map_err(|e| SonicatError::Schema(format!("tokens schema mismatch: {e}")))?;
        Ok(Self { inner: store, token_ids: DashMap::new() })
    }

    pub fn inner(&self) -> &AppDataStore {
        &self.inner
    }

    fn token_id(&self, name: &str) -> Result<i64> {
        if let Some(id) = self.token_ids.get(name) {
            return Ok(*id);
        }
        let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM token WHERE name = ?1", params![name], |r| r.get(0))
            .optional()
            .map_err(|e| SonicatError::External(format!("token lookup failed: {e}")))?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO token (name) VALUES (?1)", params![name])
                    .map_err(|e| SonicatError::External(format!("token insert failed: {e}")))?;
                conn.last_insert_rowid()
            }
        };
        self.token_ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Records one file's remaining linguistic tokens (post tempo/key
    /// extraction and filtering, per `pathparse::parse_path`) and marks
    /// the asset complete for this catalog.
    pub fn record_tokens(&self, catalog: &str, asset_id: i64, file_id: i64, tokens: &[String]) -> Result<()> {
        for token in tokens {
            let token_id = self.token_id(token)?;
            let conn = self.inner.conn.lock().expect("app-data mutex poisoned");
            conn.execute(
                "INSERT OR IGNORE INTO filepathtoken (file_id, catalog, token_id) VALUES (?1, ?2, ?3)",
                params![file_id, catalog, token_id],
            )
            .map_err(|e| SonicatError::External(format!("filepathtoken insert failed: {e}")))?;
        }
        self.inner.mark_completed(catalog, asset_id)
    }
}

impl crate::scheduler::CompletionSource for TokenStore {
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
    fn records_tokens_and_dedupes_shared_token_rows() {
        let store = TokenStore::open_in_memory().unwrap();
        store.record_tokens("samples", 1, 10, &["drums".into(), "kick".into()]).unwrap();
        store.record_tokens("samples", 2, 11, &["drums".into()]).unwrap();
        assert_eq!(store.token_id("drums").unwrap(), store.token_id("drums").unwrap());
        assert_eq!(store.inner().completed("samples").unwrap(), vec![1, 2]);
    }
}
