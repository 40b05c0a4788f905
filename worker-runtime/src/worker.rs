//! The `Worker` trait: the single seam every concrete App implements.
//!
//! Grounded on the teacher's `Connector` trait (`src/connector.rs`) —
//! one capability method (`fetch` there, `run_task` here) plus identity
//! metadata the harness needs to schedule and route it.

use async_trait::async_trait;
use sonicat::router::AppType;
use sonicat::task::Task;

/// One Sonicat App: a unit of work the Tasks scheduler can dispatch a
/// `Task` to. `run_task` never panics on a task it cannot complete — it
/// appends a failing `TaskResult` and returns, per `spec.md` §4.2's
/// "never abandon mid-Task" invariant; the only acceptable panic is a
/// programmer error (malformed task args the scheduler should never
/// have produced).
#[async_trait]
pub trait Worker: Send + Sync {
    /// The name this Worker is addressed by on the queue
    /// (`sonicat.<app_name>.*`) and in `route_target`.
    fn app_name(&self) -> &'static str;

    /// The type classification `route_target`'s rule 3 dispatches on.
    fn app_type(&self) -> AppType;

    /// Runs one Task to completion, returning it with a `TaskResult`
    /// appended. `id`/`app_name` are identity and never change. `action`/
    /// `args` are normally unchanged too; `app_data` is the one Worker
    /// that rewrites them, to hand a completed `inventory`/`librosa` task
    /// onward to `file_mover` as an `archive`/`remove` command (see
    /// DESIGN.md's "app_data as write funnel" entry).
    async fn run_task(&self, task: Task) -> Task;
}
