//! The `app_data` Worker: the sole write funnel onto derived-data stores
//! (`spec.md` §2/§4.6 — "writes funneled through app_data"). Every other
//! worker that produces derived facts (`inventory`, `librosa`,
//! `path_parser`, `discogs`, `lastfm`, `rutracker_scraper`) hands its
//! result here rather than writing a store itself; `route_target`'s
//! rule 2/3 routes all of them to `app_data`'s inbound queue.
//!
//! `app_data` is also the one documented exception to "action/args never
//! change in flight" (see `Worker::run_task`'s doc comment): an
//! `inventory` or `librosa` task routes directly here without passing
//! back through the Tasks scheduler, so `app_data` itself rewrites the
//! task into the next `file_mover` command (`archive`/`remove`) needed
//! to finish the chain. See DESIGN.md's "app_data as write funnel" entry
//! for the full routing trace this relies on.

use async_trait::async_trait;
use sonicat::appdata::analysis::AnalysisStore;
use sonicat::appdata::metadata::{MetadataStore, ReleaseMatch};
use sonicat::appdata::tokens::TokenStore;
use sonicat::catalog::CatalogStore;
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};
use std::collections::HashMap;

use crate::workers::librosa::FileAnalysis;
use crate::workers::path_parser::FileTokens;

pub struct AppDataWorker {
    catalog: CatalogStore,
    analysis: AnalysisStore,
    tokens: TokenStore,
    metadata: HashMap<String, MetadataStore>,
}

impl AppDataWorker {
    pub fn new(catalog: CatalogStore, analysis: AnalysisStore, tokens: TokenStore, metadata: HashMap<String, MetadataStore>) -> Self {
        Self { catalog, analysis, tokens, metadata }
    }

    fn arg_str(task: &Task, key: &str) -> Option<String> {
        task.args.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn arg_i64(task: &Task, key: &str) -> Option<i64> {
        task.args.get(key).and_then(|v| v.as_i64())
    }

    /// Records the `inventory` worker's survey as a new catalog asset
    /// (idempotent — an asset that already exists is treated as success,
    /// since the scheduler's redundant dead PendingCache continuation
    /// can re-fire this same task), then rewrites the task into the
    /// `file_mover.archive` command that finishes the intake chain.
    fn handle_inventory(&self, task: &mut Task) -> TaskResult {
        let payload = match task.last_result() {
            Some(r) if r.success => r.payload.clone(),
            _ => return TaskResult::fail("inventory task has no successful result to record"),
        };
        let cname = match payload.get("cname").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return TaskResult::fail("inventory payload missing 'cname'"),
        };
        let files: Vec<(String, String, i64, String)> = match payload.get("file_data").and_then(|v| v.as_array()) {
            Some(arr) => arr
                .iter()
                .map(|f| {
                    (
                        f.get("dirname").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        f.get("basename").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        f.get("size").and_then(|v| v.as_i64()).unwrap_or_default(),
                        f.get("filetype").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    )
                })
                .collect(),
            None => Vec::new(),
        };

        match self.catalog.insert_asset(&cname, false, &files) {
            Ok(_) => {}
            Err(sonicat::error::SonicatError::Validation(_)) => {
                // Already cataloged by an earlier, non-redundant pass.
            }
            Err(e) => return TaskResult::fail(e.to_string()),
        }

        let data_path = Self::arg_str(task, "data_path").unwrap_or_else(|| payload.get("data_path").and_then(|v| v.as_str()).unwrap_or_default().to_string());
        task.action = "archive".to_string();
        task.args = serde_json::json!({ "path": data_path });
        TaskResult::ok(serde_json::json!({ "cname": cname }))
    }

    /// Records one `librosa` analysis pass across its files, then
    /// rewrites the task into the `file_mover.remove` cleanup for the
    /// temp extraction this analysis consumed.
    fn handle_librosa(&self, catalog: &str, asset_id: i64, task: &mut Task) -> TaskResult {
        let payload = match task.last_result() {
            Some(r) if r.success => r.payload.clone(),
            _ => return TaskResult::fail("librosa task has no successful result to record"),
        };
        let records: Vec<FileAnalysis> = match serde_json::from_value(payload) {
            Ok(r) => r,
            Err(e) => return TaskResult::fail(format!("malformed librosa payload: {e}")),
        };

        for record in &records {
            if let Some(duration) = record.duration {
                if let Err(e) = self.analysis.record_scalar(catalog, asset_id, record.file_id, "duration", duration) {
                    return TaskResult::fail(e.to_string());
                }
            }
            if let Some(tempo) = record.tempo {
                if let Err(e) = self.analysis.record_scalar(catalog, asset_id, record.file_id, "tempo", tempo) {
                    return TaskResult::fail(e.to_string());
                }
            }
            if let Some(chroma) = record.chroma_distribution {
                if let Err(e) = self.analysis.record_chroma(catalog, asset_id, record.file_id, chroma) {
                    return TaskResult::fail(e.to_string());
                }
            }
            if let Some(ref path) = record.beat_frames_path {
                if let Err(e) = self.analysis.record_artifact_path(catalog, asset_id, record.file_id, "beat_frames", path) {
                    return TaskResult::fail(e.to_string());
                }
            }
        }

        let temp_path = Self::arg_str(task, "temp_path").unwrap_or_default();
        task.action = "remove".to_string();
        task.args = serde_json::json!({ "path": temp_path });
        TaskResult::ok(serde_json::json!({ "files_recorded": records.len() }))
    }

    /// Records one `path_parser` pass. Terminal per `route_target`'s
    /// rule 2 (`app_data` -> "" for anything but `inventory`/`librosa`):
    /// no task rewrite follows. `tempo`/`key` are dropped — `TokenStore`
    /// has no columns for them (see DESIGN.md).
    fn handle_path_parser(&self, catalog: &str, asset_id: i64, task: &Task) -> TaskResult {
        let payload = match task.last_result() {
            Some(r) if r.success => r.payload.clone(),
            _ => return TaskResult::fail("path_parser task has no successful result to record"),
        };
        let records: Vec<FileTokens> = match serde_json::from_value(payload) {
            Ok(r) => r,
            Err(e) => return TaskResult::fail(format!("malformed path_parser payload: {e}")),
        };
        for record in &records {
            if let Err(e) = self.tokens.record_tokens(catalog, asset_id, record.file_id, &record.tokens) {
                return TaskResult::fail(e.to_string());
            }
        }
        TaskResult::ok(serde_json::json!({ "files_recorded": records.len() }))
    }

    /// Records one metadata worker's search outcome. Terminal, same as
    /// `path_parser`.
    fn handle_metadata(&self, app_name: &str, catalog: &str, asset_id: i64, task: &Task) -> TaskResult {
        let store = match self.metadata.get(app_name) {
            Some(s) => s,
            None => return TaskResult::fail(format!("no metadata store configured for '{app_name}'")),
        };
        let payload = match task.last_result() {
            Some(r) if r.success => r.payload.clone(),
            _ => return TaskResult::fail("metadata task has no successful result to record"),
        };
        let matched = payload.get("matched").and_then(|v| v.as_bool()).unwrap_or(false);
        if !matched {
            return match store.inner().record_failed_search(catalog, asset_id) {
                Ok(()) => TaskResult::ok(serde_json::json!({ "matched": false })),
                Err(e) => TaskResult::fail(e.to_string()),
            };
        }
        let release: ReleaseMatch = match payload.get("release").cloned().map(serde_json::from_value) {
            Some(Ok(r)) => r,
            _ => return TaskResult::fail("matched=true but 'release' is missing or malformed"),
        };
        match store.record_match(catalog, asset_id, &release) {
            Ok(()) => TaskResult::ok(serde_json::json!({ "matched": true, "external_id": release.external_id })),
            Err(e) => TaskResult::fail(e.to_string()),
        }
    }
}

#[async_trait]
impl crate::Worker for AppDataWorker {
    fn app_name(&self) -> &'static str {
        "app_data"
    }

    fn app_type(&self) -> AppType {
        AppType::System
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let source_app = task.app_name.clone();
        let catalog = Self::arg_str(&task, "catalog").unwrap_or_default();
        let asset_id = Self::arg_i64(&task, "asset_id").unwrap_or_default();

        let result = match source_app.as_str() {
            "inventory" => self.handle_inventory(&mut task),
            "librosa" => self.handle_librosa(&catalog, asset_id, &mut task),
            "path_parser" => self.handle_path_parser(&catalog, asset_id, &task),
            "discogs" | "lastfm" | "rutracker_scraper" => self.handle_metadata(&source_app, &catalog, asset_id, &task),
            other => TaskResult::fail(format!("app_data has no handler for source app '{other}'")),
        };
        task.results.push(result);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Worker;

    fn worker() -> AppDataWorker {
        let mut metadata = HashMap::new();
        metadata.insert("discogs".to_string(), MetadataStore::open_in_memory().unwrap());
        AppDataWorker::new(
            CatalogStore::open_in_memory().unwrap(),
            AnalysisStore::open_in_memory().unwrap(),
            TokenStore::open_in_memory().unwrap(),
            metadata,
        )
    }

    #[tokio::test]
    async fn inventory_task_is_inserted_and_rewritten_to_archive() {
        let worker = worker();
        let mut task = Task::new("1".into(), "inventory", "inventory", serde_json::json!({ "data_path": "/managed/acme_sounds/Acme Sounds - Pack Vol 1" }));
        task.results.push(TaskResult::ok(serde_json::json!({
            "cname": "Acme Sounds - Pack Vol 1",
            "data_path": "/managed/acme_sounds/Acme Sounds - Pack Vol 1",
            "file_data": [{"dirname": "", "basename": "kick.wav", "size": 4, "filetype": "wav"}],
        })));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(done.action, "archive");
        assert_eq!(done.args["path"], "/managed/acme_sounds/Acme Sounds - Pack Vol 1");
        assert!(worker.catalog.asset_id_by_cname("Acme Sounds - Pack Vol 1").unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_inventory_task_is_idempotent() {
        let worker = worker();
        worker.catalog.insert_asset("Acme Sounds - Pack Vol 1", false, &[(String::new(), "kick.wav".into(), 4, "wav".into())]).unwrap();
        let mut task = Task::new("1".into(), "inventory", "inventory", serde_json::json!({ "data_path": "/managed/acme_sounds/Acme Sounds - Pack Vol 1" }));
        task.results.push(TaskResult::ok(serde_json::json!({
            "cname": "Acme Sounds - Pack Vol 1",
            "file_data": [{"dirname": "", "basename": "kick.wav", "size": 4, "filetype": "wav"}],
        })));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(done.action, "archive");
    }

    #[tokio::test]
    async fn librosa_task_is_recorded_and_rewritten_to_remove() {
        let worker = worker();
        let mut task = Task::new(
            "1".into(),
            "librosa",
            "basic",
            serde_json::json!({ "asset_id": 1, "catalog": "samples", "temp_path": "/tmp/sonicat-tasks/x" }),
        );
        task.results.push(TaskResult::ok(serde_json::json!([
            { "file_id": 10, "duration": 212.0, "tempo": 128.0, "chroma_distribution": null, "beat_frames_path": null },
        ])));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(done.action, "remove");
        assert_eq!(done.args["path"], "/tmp/sonicat-tasks/x");
        assert_eq!(worker.analysis.duration_for_file("samples", 10).unwrap(), Some(212.0));
    }

    #[tokio::test]
    async fn path_parser_task_records_tokens_without_rewrite() {
        let worker = worker();
        let mut task = Task::new("1".into(), "path_parser", "parse", serde_json::json!({ "asset_id": 1, "catalog": "samples" }));
        task.results.push(TaskResult::ok(serde_json::json!([
            { "file_id": 10, "tempo": 128, "key": "", "tokens": ["drums", "kick"] },
        ])));
        let original_action = task.action.clone();
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(done.action, original_action);
        assert_eq!(worker.tokens.inner().completed("samples").unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn metadata_match_is_recorded() {
        let worker = worker();
        let mut task = Task::new("1".into(), "discogs", "search", serde_json::json!({ "asset_id": 1, "catalog": "samples" }));
        task.results.push(TaskResult::ok(serde_json::json!({
            "matched": true,
            "release": { "external_id": "123", "title": "Pack Vol 1", "tracks": [212.0], "tags": [], "formats": [] },
        })));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(worker.metadata["discogs"].inner().completed("samples").unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn metadata_miss_is_recorded_as_failed_search() {
        let worker = worker();
        let mut task = Task::new("1".into(), "discogs", "search", serde_json::json!({ "asset_id": 1, "catalog": "samples" }));
        task.results.push(TaskResult::ok(serde_json::json!({ "matched": false })));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(worker.metadata["discogs"].inner().failed("samples").unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn unknown_source_app_fails() {
        let worker = worker();
        let task = Task::new("1".into(), "mystery", "whatever", serde_json::json!({}));
        let done = worker.run_task(task).await;
        assert!(!done.succeeded());
    }
}
