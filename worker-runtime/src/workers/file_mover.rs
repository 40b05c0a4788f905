//! The `file_mover` Worker: a thin dispatch shim over
//! `sonicat::filemover::FileMover`, per `spec.md` §2/§9 — the only Worker
//! allowed to touch the managed tree or shell out to `rar`/`unrar`.
//!
//! Every action this worker runs arrives either freshly minted by the
//! Tasks scheduler (`move`/`restore`/`remove`/`archive`, with the exact
//! `{from,to}`/`{path}` args shapes `scheduler::make_intake_tasks`/
//! `make_asset_tasks` build) or rewritten in flight by `app_data` forwarding
//! an `inventory`/`librosa` completion onward. An action this worker
//! doesn't recognize is treated as a no-op forward rather than a failure —
//! `app_data` only rewrites the actions it means to, and a worker-sourced
//! task that reaches here unrewritten (e.g. a `discogs` search result
//! `app_data` had nothing further to do with) has nothing for `file_mover`
//! to act on.

use async_trait::async_trait;
use sonicat::filemover::FileMover;
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};
use std::path::Path;

pub struct FileMoverWorker {
    mover: FileMover,
}

impl FileMoverWorker {
    pub fn new() -> Self {
        Self { mover: FileMover::new("file_mover") }
    }

    pub fn with_mover(mover: FileMover) -> Self {
        Self { mover }
    }

    fn arg_str(task: &Task, key: &str) -> Option<String> {
        task.args.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn run(&self, task: &Task) -> TaskResult {
        match task.action.as_str() {
            "move" => {
                let (Some(from), Some(to)) = (Self::arg_str(task, "from"), Self::arg_str(task, "to")) else {
                    return TaskResult::fail("move requires 'from' and 'to'");
                };
                match self.mover.move_path(Path::new(&from), Path::new(&to)) {
                    Ok(()) => TaskResult::ok(serde_json::json!({ "from": from, "to": to })),
                    Err(e) => TaskResult::fail(e.to_string()),
                }
            }
            "remove" => {
                let Some(path) = Self::arg_str(task, "path") else {
                    return TaskResult::fail("remove requires 'path'");
                };
                match self.mover.remove(Path::new(&path)) {
                    Ok(()) => TaskResult::ok(serde_json::json!({ "path": path })),
                    Err(e) => TaskResult::fail(e.to_string()),
                }
            }
            "restore" => {
                let (Some(from), Some(to)) = (Self::arg_str(task, "from"), Self::arg_str(task, "to")) else {
                    return TaskResult::fail("restore requires 'from' and 'to'");
                };
                match self.mover.restore(Path::new(&from), Path::new(&to)) {
                    Ok(()) => TaskResult::ok(serde_json::json!({ "from": from, "to": to })),
                    Err(e) => TaskResult::fail(e.to_string()),
                }
            }
            "archive" => {
                let Some(path) = Self::arg_str(task, "path") else {
                    return TaskResult::fail("archive requires 'path'");
                };
                match self.mover.archive(Path::new(&path)) {
                    Ok(archive_path) => {
                        TaskResult::ok(serde_json::json!({ "path": path, "archive_path": archive_path.to_string_lossy() }))
                    }
                    Err(e) => TaskResult::fail(e.to_string()),
                }
            }
            other => {
                TaskResult::ok(serde_json::json!({ "note": format!("file_mover has nothing to do for action '{other}'") }))
            }
        }
    }
}

impl Default for FileMoverWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::Worker for FileMoverWorker {
    fn app_name(&self) -> &'static str {
        "file_mover"
    }

    fn app_type(&self) -> AppType {
        AppType::System
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let result = self.run(&task);
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
    async fn move_relocates_a_directory() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("intake/Acme Sounds - Pack Vol 1");
        std::fs::create_dir_all(&from).unwrap();
        std::fs::write(from.join("kick.wav"), b"data").unwrap();
        let to = dir.path().join("managed/acme_sounds/Acme Sounds - Pack Vol 1");

        let worker = FileMoverWorker::with_mover(FileMover::with_temp_root(dir.path().join("tmp")));
        let task = Task::new(
            "1".into(),
            "file_mover",
            "move",
            serde_json::json!({ "from": from.to_string_lossy(), "to": to.to_string_lossy() }),
        );
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
        assert!(to.join("kick.wav").exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent_on_a_missing_path() {
        let dir = TempDir::new().unwrap();
        let worker = FileMoverWorker::with_mover(FileMover::with_temp_root(dir.path()));
        let task = Task::new("1".into(), "file_mover", "remove", serde_json::json!({ "path": dir.path().join("ghost").to_string_lossy() }));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
    }

    #[tokio::test]
    async fn missing_args_fail_cleanly() {
        let dir = TempDir::new().unwrap();
        let worker = FileMoverWorker::with_mover(FileMover::with_temp_root(dir.path()));
        let task = Task::new("1".into(), "file_mover", "move", serde_json::json!({}));
        let done = worker.run_task(task).await;
        assert!(!done.succeeded());
    }

    #[tokio::test]
    async fn unrecognized_action_is_a_harmless_forward() {
        let dir = TempDir::new().unwrap();
        let worker = FileMoverWorker::with_mover(FileMover::with_temp_root(dir.path()));
        let task = Task::new("1".into(), "discogs", "search", serde_json::json!({}));
        let done = worker.run_task(task).await;
        assert!(done.succeeded());
    }
}
