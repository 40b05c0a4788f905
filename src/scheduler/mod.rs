//! The Tasks scheduler (`spec.md` §4.1): enumerates outstanding work and
//! emits a bounded stream of Tasks, sequencing dependent steps through
//! the `PendingTaskCache` so a continuation only runs once its
//! predecessor has succeeded.

use crate::catalog::CatalogStore;
use crate::config::CatalogTaskConfig;
use crate::error::{Result, SonicatError};
use crate::filemover::FileMover;
use crate::name::{label_dir_from_cname, name_is_canonical};
use crate::task::{PendingTaskCache, Task, TaskIdGenerator};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// The two negative filters an AppDataStore exposes, object-safe so the
/// scheduler can hold one per app name without knowing each store's
/// concrete payload shape (`spec.md` §4.6).
pub trait CompletionSource: Send + Sync {
    fn completed(&self, catalog: &str) -> Result<Vec<i64>>;
    fn failed(&self, catalog: &str) -> Result<Vec<i64>>;
}

impl CompletionSource for crate::appdata::AppDataStore {
    fn completed(&self, catalog: &str) -> Result<Vec<i64>> {
        crate::appdata::AppDataStore::completed(self, catalog)
    }
    fn failed(&self, catalog: &str) -> Result<Vec<i64>> {
        crate::appdata::AppDataStore::failed(self, catalog)
    }
}

/// Apps whose Tasks require restored raw file bytes — only these trigger
/// `file_mover.restore`/`file_mover.remove` bracketing for an asset,
/// per `spec.md` §4.1 step 4.
const NEEDS_RAW_BYTES: &[&str] = &["librosa"];

/// Extensions audible/parseable by the given worker app, mirroring the
/// original's `add_args_file_data`/`add_args_file_paths` per-app
/// `cached_filetype_id` filter (`original_source/apps/sys/Tasks.py`:
/// `librosa` -> `"wav"`, `cue_parser` -> `"cue"`). `path_parser` gets the
/// original's broader `Parser.py::audio_exts` set since it tokenizes any
/// audio path, not just WAVs. Apps not listed here see every file in the
/// asset (`None`), per `spec.md` §4.1 step 4's "filtered by extension"
/// applying only where a worker is scoped to one file kind.
fn file_extensions_for(app: &str) -> Option<&'static [&'static str]> {
    const WAV: &[&str] = &["wav"];
    const AUDIO: &[&str] = &["aif", "aiff", "flac", "mid", "midi", "mp3", "ogg", "wav"];
    match app {
        "librosa" => Some(WAV),
        "path_parser" => Some(AUDIO),
        _ => None,
    }
}

pub struct TasksScheduler {
    pub catalog_name: String,
    pub catalog_store: CatalogStore,
    pub completion_sources: HashMap<String, Box<dyn CompletionSource>>,
    pub task_config: CatalogTaskConfig,
    pub managed_path: PathBuf,
    pub intake_path: PathBuf,
    pub threshold: usize,
    pub idle_sleep: Duration,
    file_mover: FileMover,
    ids: TaskIdGenerator,
    pending: Mutex<PendingTaskCache>,
}

impl TasksScheduler {
    pub fn new(
        catalog_name: impl Into<String>,
        catalog_store: CatalogStore,
        completion_sources: HashMap<String, Box<dyn CompletionSource>>,
        task_config: CatalogTaskConfig,
        managed_path: PathBuf,
        intake_path: PathBuf,
        threshold: usize,
        idle_sleep: Duration,
    ) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            catalog_store,
            completion_sources,
            task_config,
            managed_path,
            intake_path,
            threshold,
            idle_sleep,
            file_mover: FileMover::new("tasks"),
            ids: TaskIdGenerator::new(),
            pending: Mutex::new(PendingTaskCache::new()),
        }
    }

    /// `run_cycle(incoming) -> Task[]`, per `spec.md` §4.1. `None` means
    /// "no completion arrived this tick, generate fresh work"; `Some`
    /// completions either dispatch as a control-plane command
    /// (`app_name == "command_bridge"`) or release a PendingCache
    /// continuation on success.
    pub fn run_cycle(&self, incoming: Option<Task>) -> Result<Vec<Task>> {
        match incoming {
            None => self.make_tasks(),
            Some(task) if task.app_name == "command_bridge" => {
                info!(action = %task.action, "dispatching control-plane command");
                Ok(Vec::new())
            }
            Some(task) => {
                if task.succeeded() {
                    let mut pending = self.pending.lock().expect("pending cache mutex poisoned");
                    Ok(pending.check_in(&task.id))
                } else {
                    // Non-success completions are not auto-retried here; the
                    // worker already recorded the outcome (ledger or
                    // failed-search row) and the asset reappears at the
                    // next make_tasks pass.
                    Ok(Vec::new())
                }
            }
        }
    }

    /// Reclaims orphaned restored-temp directories on startup: any
    /// `<temp>/<cname>` with no matching in-flight Task is removed via
    /// `file_mover.remove`, per `spec.md` §4.1's restart semantics.
    pub fn reclaim_orphans(&self) -> Result<Vec<Task>> {
        let orphans = self.file_mover.list_temp_dirs()?;
        let mut tasks = Vec::new();
        for dir in orphans {
            let path = dir.to_string_lossy().to_string();
            warn!(path = %path, "reclaiming orphaned temp directory on startup");
            tasks.push(self.ids.make("file_mover", "remove", serde_json::json!({ "path": path })));
        }
        Ok(tasks)
    }

    /// `make_tasks(catalogs?) -> Task[]` restricted to this scheduler's
    /// one catalog (multi-catalog fan-out happens one `TasksScheduler`
    /// per catalog, at the `tasksd` binary level).
    pub fn make_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = self.make_intake_tasks()?;
        tasks.extend(self.make_asset_tasks()?);
        Ok(tasks)
    }

    /// SUPPLEMENT (`SPEC_FULL.md` §4.1): canonically-named intake
    /// directories not yet in the catalog are moved into the managed
    /// tree, surveyed, and archived.
    fn make_intake_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        if !self.intake_path.exists() {
            return Ok(tasks);
        }
        let entries = std::fs::read_dir(&self.intake_path)
            .map_err(|e| SonicatError::External(format!("cannot read intake path: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| SonicatError::External(format!("intake directory read failed: {e}")))?;
            if !entry.path().is_dir() {
                continue;
            }
            let cname = entry.file_name().to_string_lossy().to_string();
            if !name_is_canonical(&cname) {
                warn!(cname = %cname, "skipping non-canonical intake directory");
                continue;
            }
            let already_present = self
                .catalog_store
                .all_asset_ids()?
                .into_iter()
                .filter_map(|id| self.catalog_store.cname(id).ok().flatten())
                .any(|existing| existing == cname);
            if already_present {
                continue;
            }
            let label_dir = label_dir_from_cname(&cname);
            let dest = self.managed_path.join(label_dir).join(&cname);

            let move_task = self.ids.make(
                "file_mover",
                "move",
                serde_json::json!({ "from": entry.path().to_string_lossy(), "to": dest.to_string_lossy() }),
            );
            let inventory_task =
                self.ids.make("inventory", "inventory", serde_json::json!({ "data_path": dest.to_string_lossy() }));
            let archive_task =
                self.ids.make("file_mover", "archive", serde_json::json!({ "path": dest.to_string_lossy() }));

            let mut pending = self.pending.lock().expect("pending cache mutex poisoned");
            pending.register(move_task.id.clone(), vec![inventory_task.clone()]);
            pending.register(inventory_task.id.clone(), vec![archive_task]);
            drop(pending);

            tasks.push(move_task);
        }
        Ok(tasks)
    }

    fn make_asset_tasks(&self) -> Result<Vec<Task>> {
        let all_assets: HashSet<i64> = self.catalog_store.all_asset_ids()?.into_iter().collect();

        // tasks_by_asset[asset_id] -> [(app, action), ...], inverted from
        // the per-(app,action) pending sets so all work for one asset is
        // issued together (spec.md §4.1 step 3).
        let mut tasks_by_asset: HashMap<i64, Vec<(String, String)>> = HashMap::new();

        for (_worker_type, apps) in &self.task_config {
            for (app, worker_task) in apps {
                let source = match self.completion_sources.get(app) {
                    Some(s) => s,
                    None => continue,
                };
                let completed: HashSet<i64> = source.completed(&self.catalog_name)?.into_iter().collect();
                let failed: HashSet<i64> = source.failed(&self.catalog_name)?.into_iter().collect();
                // Tie-break: completed wins when an asset appears in both.
                let outstanding: Vec<i64> =
                    all_assets.iter().filter(|a| !completed.contains(a) && !failed.contains(a)).copied().collect();

                for asset_id in outstanding {
                    for action in &worker_task.actions {
                        tasks_by_asset.entry(asset_id).or_default().push((app.clone(), action.clone()));
                    }
                }
            }
        }

        if tasks_by_asset.is_empty() {
            info!(catalog = %self.catalog_name, "no outstanding work, idling");
            return Ok(Vec::new());
        }

        let mut asset_ids: Vec<i64> = tasks_by_asset.keys().copied().collect();
        asset_ids.sort_unstable();
        if self.threshold > 0 && asset_ids.len() > self.threshold {
            asset_ids.truncate(self.threshold);
        }

        let mut emitted = Vec::new();
        for asset_id in asset_ids {
            let work = &tasks_by_asset[&asset_id];
            let needs_extraction = work.iter().any(|(app, _)| NEEDS_RAW_BYTES.contains(&app.as_str()));

            if needs_extraction && !self.catalog_store.is_managed(asset_id)? {
                warn!(asset_id, "skipping unmanaged asset queued for extraction");
                continue;
            }

            let cname = match self.catalog_store.cname(asset_id)? {
                Some(c) => c,
                None => continue,
            };
            let temp_path = self.file_mover.temp_path(&cname);

            let mut chain: Vec<Task> = Vec::new();
            if needs_extraction {
                let label_dir = label_dir_from_cname(&cname);
                let archive_path = self.managed_path.join(label_dir).join(format!("{cname}.rar"));
                chain.push(self.ids.make(
                    "file_mover",
                    "restore",
                    serde_json::json!({ "from": archive_path.to_string_lossy(), "to": temp_path.to_string_lossy() }),
                ));
            }

            for (app, action) in work {
                let files = self.catalog_store.files_by_asset(asset_id, file_extensions_for(app))?;
                chain.push(self.ids.make(
                    app.as_str(),
                    action.as_str(),
                    serde_json::json!({
                        "asset_id": asset_id,
                        "cname": cname,
                        "catalog": self.catalog_name,
                        "temp_path": temp_path.to_string_lossy(),
                        "file_data": files,
                    }),
                ));
            }

            if needs_extraction {
                chain.push(self.ids.make("file_mover", "remove", serde_json::json!({ "path": temp_path.to_string_lossy() })));
            }

            if chain.is_empty() {
                continue;
            }

            let mut pending = self.pending.lock().expect("pending cache mutex poisoned");
            for pair in chain.windows(2) {
                pending.register(pair[0].id.clone(), vec![pair[1].clone()]);
            }
            drop(pending);

            emitted.push(chain.remove(0));
        }

        Ok(emitted)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending cache mutex poisoned").len()
    }
}
