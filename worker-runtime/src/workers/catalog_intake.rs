//! The `catalog_intake` Worker: standalone maintenance actions over the
//! `CatalogStore`, outside the live routing graph `route_target`
//! describes (there is no rule in `sonicat::router` that ever names
//! `catalog_intake` — it is operator-triggered, not Tasks-scheduler
//! driven, per `spec.md` §4.5's note that write access is held by
//! `catalog_intake` and `app_data`).
//!
//! Grounded on `original_source/interfaces/Inventory.py`'s
//! `check_coverage`/`crosscheck_lists` (the `reconcile` action) and
//! `unmanaged_batch_intake` (the `batch_intake` action).

use async_trait::async_trait;
use sonicat::catalog::CatalogStore;
use sonicat::name::{file_extension, name_is_canonical};
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};
use std::collections::HashSet;
use std::path::Path;

pub struct CatalogIntakeWorker {
    catalog: CatalogStore,
}

impl CatalogIntakeWorker {
    pub fn new(catalog: CatalogStore) -> Self {
        Self { catalog }
    }

    fn survey(dir: &Path) -> std::io::Result<Vec<(String, String, i64, String)>> {
        let mut out = Vec::new();
        Self::walk(dir, dir, &mut out)?;
        Ok(out)
    }

    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, String, i64, String)>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                Self::walk(root, &path, out)?;
                continue;
            }
            let basename = entry.file_name().to_string_lossy().to_string();
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

    /// Compares the managed tree on disk against the catalog's asset
    /// list, writing any mismatch (a managed directory absent from the
    /// catalog, or a catalog asset absent from disk) to `report_path` as
    /// a flat CSV, per `Inventory.py`'s `check_coverage`.
    fn reconcile(&self, managed_path: &str, report_path: &str) -> sonicat::error::Result<serde_json::Value> {
        let on_disk: HashSet<String> = std::fs::read_dir(managed_path)
            .map_err(|e| sonicat::error::SonicatError::External(format!("cannot read managed path: {e}")))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .flat_map(|label_dir| {
                std::fs::read_dir(label_dir.path())
                    .into_iter()
                    .flatten()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();

        let cataloged: HashSet<String> = self
            .catalog
            .all_asset_ids()?
            .into_iter()
            .filter_map(|id| self.catalog.cname(id).ok().flatten())
            .collect();

        let missing_from_catalog: Vec<&String> = on_disk.difference(&cataloged).collect();
        let missing_from_disk: Vec<&String> = cataloged.difference(&on_disk).collect();

        let mut csv = String::from("cname,issue\n");
        for cname in &missing_from_catalog {
            csv.push_str(&format!("{cname},missing_from_catalog\n"));
        }
        for cname in &missing_from_disk {
            csv.push_str(&format!("{cname},missing_from_disk\n"));
        }
        std::fs::write(report_path, csv)
            .map_err(|e| sonicat::error::SonicatError::External(format!("cannot write report: {e}")))?;

        Ok(serde_json::json!({
            "report_path": report_path,
            "missing_from_catalog": missing_from_catalog.len(),
            "missing_from_disk": missing_from_disk.len(),
        }))
    }

    /// Scans `intake_path` for canonically-named directories that are
    /// not yet in the catalog and inserts them unmanaged (no archive has
    /// been produced for them yet), per `Inventory.py`'s
    /// `unmanaged_batch_intake`. Individual insert failures are skipped
    /// rather than aborting the whole batch.
    fn batch_intake(&self, intake_path: &str) -> sonicat::error::Result<serde_json::Value> {
        let mut inserted = Vec::new();
        let entries = std::fs::read_dir(intake_path)
            .map_err(|e| sonicat::error::SonicatError::External(format!("cannot read intake path: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| sonicat::error::SonicatError::External(format!("read failed: {e}")))?;
            if !entry.path().is_dir() {
                continue;
            }
            let cname = entry.file_name().to_string_lossy().to_string();
            if !name_is_canonical(&cname) {
                continue;
            }
            if self.catalog.asset_id_by_cname(&cname)?.is_some() {
                continue;
            }
            let files = match Self::survey(&entry.path()) {
                Ok(f) if !f.is_empty() => f,
                _ => continue,
            };
            if self.catalog.insert_asset(&cname, false, &files).is_ok() {
                inserted.push(cname);
            }
        }
        Ok(serde_json::json!({ "inserted": inserted }))
    }
}

#[async_trait]
impl crate::Worker for CatalogIntakeWorker {
    fn app_name(&self) -> &'static str {
        "catalog_intake"
    }

    fn app_type(&self) -> AppType {
        AppType::System
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let result = match task.action.as_str() {
            "reconcile" => {
                let managed_path = task.args.get("managed_path").and_then(|v| v.as_str()).unwrap_or_default();
                let report_path =
                    task.args.get("report_path").and_then(|v| v.as_str()).unwrap_or("noncompliant-assets.csv");
                match self.reconcile(managed_path, report_path) {
                    Ok(payload) => TaskResult::ok(payload),
                    Err(e) => TaskResult::fail(e.to_string()),
                }
            }
            "batch_intake" => {
                let intake_path = task.args.get("intake_path").and_then(|v| v.as_str()).unwrap_or_default();
                match self.batch_intake(intake_path) {
                    Ok(payload) => TaskResult::ok(payload),
                    Err(e) => TaskResult::fail(e.to_string()),
                }
            }
            other => TaskResult::fail(format!("catalog_intake has no action '{other}'")),
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
    async fn batch_intake_inserts_canonical_unmanaged_directories() {
        let dir = TempDir::new().unwrap();
        let intake = dir.path().join("intake");
        let asset = intake.join("Acme Sounds - Pack Vol 1");
        std::fs::create_dir_all(&asset).unwrap();
        std::fs::write(asset.join("kick.wav"), b"data").unwrap();
        std::fs::create_dir_all(intake.join("not canonical")).unwrap();

        let worker = CatalogIntakeWorker::new(CatalogStore::open_in_memory().unwrap());
        let task = Task::new(
            "1".into(),
            "catalog_intake",
            "batch_intake",
            serde_json::json!({ "intake_path": intake.to_string_lossy() }),
        );
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        let inserted = done.last_result().unwrap().payload["inserted"].as_array().unwrap().clone();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0], "Acme Sounds - Pack Vol 1");
        assert!(worker.catalog.asset_id_by_cname("Acme Sounds - Pack Vol 1").unwrap().is_some());
    }

    #[tokio::test]
    async fn batch_intake_skips_already_cataloged_assets() {
        let dir = TempDir::new().unwrap();
        let intake = dir.path().join("intake");
        let asset = intake.join("Acme Sounds - Pack Vol 1");
        std::fs::create_dir_all(&asset).unwrap();
        std::fs::write(asset.join("kick.wav"), b"data").unwrap();

        let catalog = CatalogStore::open_in_memory().unwrap();
        catalog
            .insert_asset("Acme Sounds - Pack Vol 1", true, &[(String::new(), "kick.wav".into(), 4, "wav".into())])
            .unwrap();
        let worker = CatalogIntakeWorker::new(catalog);
        let task = Task::new(
            "1".into(),
            "catalog_intake",
            "batch_intake",
            serde_json::json!({ "intake_path": intake.to_string_lossy() }),
        );
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(done.last_result().unwrap().payload["inserted"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn reconcile_reports_assets_missing_from_disk() {
        let dir = TempDir::new().unwrap();
        let managed = dir.path().join("managed");
        std::fs::create_dir_all(&managed).unwrap();
        let report = dir.path().join("report.csv");

        let catalog = CatalogStore::open_in_memory().unwrap();
        catalog
            .insert_asset("Acme Sounds - Pack Vol 1", true, &[(String::new(), "kick.wav".into(), 4, "wav".into())])
            .unwrap();
        let worker = CatalogIntakeWorker::new(catalog);
        let task = Task::new(
            "1".into(),
            "catalog_intake",
            "reconcile",
            serde_json::json!({ "managed_path": managed.to_string_lossy(), "report_path": report.to_string_lossy() }),
        );
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert_eq!(done.last_result().unwrap().payload["missing_from_disk"], 1);
        assert!(report.exists());
    }

    #[tokio::test]
    async fn unrecognized_action_fails() {
        let worker = CatalogIntakeWorker::new(CatalogStore::open_in_memory().unwrap());
        let task = Task::new("1".into(), "catalog_intake", "bogus", serde_json::json!({}));
        let done = worker.run_task(task).await;
        assert!(!done.succeeded());
    }
}
