//! The `inventory` Worker: surveys a directory on disk and reports its
//! files, per `spec.md` §4.4's `inventory.inventory(data_path)`. Grounded
//! on `original_source/interfaces/Inventory.py`'s `survey_directory`
//! walk, simplified to the one shape the scheduler actually needs: a
//! flat `(dirname, basename, size, filetype)` record per file, relative
//! to `data_path` itself.
//!
//! Writes nothing — `app_data` holds the `CatalogStore` write handle
//! (`spec.md` §2) and inserts the asset once this worker's survey comes
//! back, per DESIGN.md's "app_data as write funnel" entry.

use async_trait::async_trait;
use sonicat::name::file_extension;
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};
use std::path::Path;

/// Filenames a real filesystem walk accumulates that carry no audio
/// content and should never become catalog rows. `spec.md`'s config has
/// no blacklist field of its own, so this list is a fixed simplification
/// rather than something an operator can extend.
const BLACKLIST: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

pub struct InventoryWorker;

impl InventoryWorker {
    pub fn new() -> Self {
        Self
    }

    /// Recursively walks `root`, returning `(dirname, basename, size,
    /// filetype)` for every non-blacklisted file, `dirname` relative to
    /// `root` itself (empty for files directly inside it).
    fn survey(root: &Path) -> std::io::Result<Vec<(String, String, i64, String)>> {
        let mut out = Vec::new();
        Self::walk(root, root, &mut out)?;
        Ok(out)
    }

    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, String, i64, String)>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                Self::walk(root, &path, out)?;
                continue;
            }
            let basename = entry.file_name().to_string_lossy().to_string();
            if BLACKLIST.contains(&basename.as_str()) {
                continue;
            }
            let dirname = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            let size = entry.metadata()?.len() as i64;
            let ext = file_extension(&basename);
            out.push((dirname, basename, size, ext));
        }
        Ok(())
    }
}

impl Default for InventoryWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::Worker for InventoryWorker {
    fn app_name(&self) -> &'static str {
        "inventory"
    }

    fn app_type(&self) -> AppType {
        AppType::System
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let Some(data_path) = task.args.get("data_path").and_then(|v| v.as_str()) else {
            task.results.push(TaskResult::fail("inventory requires 'data_path'"));
            return task;
        };
        let root = Path::new(data_path);
        let cname = root.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        let result = match Self::survey(root) {
            Ok(files) => TaskResult::ok(serde_json::json!({
                "cname": cname,
                "data_path": data_path,
                "file_data": files.iter().map(|(dirname, basename, size, filetype)| {
                    serde_json::json!({ "dirname": dirname, "basename": basename, "size": size, "filetype": filetype })
                }).collect::<Vec<_>>(),
            })),
            Err(e) => TaskResult::fail(format!("survey of '{data_path}' failed: {e}")),
        };
        task.results.push(result);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Worker;
    use tempfile::TempDir;

    #[tokio::test]
    async fn surveys_nested_files_and_skips_blacklisted_names() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("Acme Sounds - Pack Vol 1");
        std::fs::create_dir_all(asset.join("Drums")).unwrap();
        std::fs::write(asset.join("Drums/kick.wav"), b"data").unwrap();
        std::fs::write(asset.join(".DS_Store"), b"junk").unwrap();

        let worker = InventoryWorker::new();
        let task = Task::new("1".into(), "inventory", "inventory", serde_json::json!({ "data_path": asset.to_string_lossy() }));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        let payload = &done.last_result().unwrap().payload;
        assert_eq!(payload["cname"], "Acme Sounds - Pack Vol 1");
        let files = payload["file_data"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["basename"], "kick.wav");
        assert_eq!(files[0]["dirname"], "Drums");
        assert_eq!(files[0]["filetype"], "wav");
    }

    #[tokio::test]
    async fn missing_data_path_fails_cleanly() {
        let worker = InventoryWorker::new();
        let task = Task::new("1".into(), "inventory", "inventory", serde_json::json!({}));
        let done = worker.run_task(task).await;
        assert!(!done.succeeded());
    }
}
