//! The AppRunner harness: the Idle/Dequeued/Processing/Routed state
//! machine every worker process runs, per `spec.md` §4.2.
//!
//! Grounded on the teacher's `ConnectorScheduler` (`runners/builtin.rs`):
//! an interval-tick polling loop with status tracking and error-count
//! bookkeeping, generalized here from "poll one external API, publish
//! to Flux" to "dequeue one Task, run it, route the result onward".
//! Shutdown is cooperative rather than the teacher's bare `tokio::spawn`
//! loop — `spec.md` requires a worker to finish its current cycle and
//! never abandon a Task mid-flight.

use sonicat::nats::{PendingAck, QueueKind, TaskQueue};
use sonicat::router::route_target;
use sonicat::task::Task;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::Worker;

/// Status counters for a running AppRunner — analogous to the teacher's
/// `ConnectorStatus`, surfaced for a future admin/health endpoint rather
/// than used internally.
#[derive(Clone, Debug, Default)]
pub struct RunnerStatus {
    pub cycles: u64,
    pub tasks_run: u64,
    pub tasks_failed: u64,
    pub last_error: Option<String>,
}

/// Drives one [`Worker`] against its queue: command queue first (control
/// messages take priority over backlog), then inbound. A cycle with
/// nothing to do sleeps `idle_sleep` before polling again, mirroring the
/// `Idle -> IdlePoll -> Idle` loop of `spec.md` §4.2.
pub struct AppRunner<W: Worker> {
    worker: W,
    queue: TaskQueue,
    idle_sleep: Duration,
    shutdown: Arc<AtomicBool>,
    status: std::sync::Mutex<RunnerStatus>,
}

impl<W: Worker> AppRunner<W> {
    pub fn new(worker: W, queue: TaskQueue, idle_sleep: Duration) -> Self {
        Self {
            worker,
            queue,
            idle_sleep,
            shutdown: Arc::new(AtomicBool::new(false)),
            status: std::sync::Mutex::new(RunnerStatus::default()),
        }
    }

    /// A clone-able flag a signal handler can set to request shutdown.
    /// Checked only between cycles — a Task already dequeued always runs
    /// to completion and is routed before the runner exits.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn status(&self) -> RunnerStatus {
        self.status.lock().expect("runner status mutex poisoned").clone()
    }

    /// Dequeues one Task along with its unacked [`PendingAck`] — the ack
    /// is deferred until `run_cycle` has routed the processed Task
    /// onward, so a crash mid-cycle redelivers instead of dropping it.
    async fn next_task(&self) -> Option<(Task, PendingAck)> {
        match self.queue.next(self.worker.app_name(), QueueKind::Command).await {
            Ok(Some(pair)) => return Some(pair),
            Ok(None) => {}
            Err(e) => warn!(app = self.worker.app_name(), error = %e, "command queue poll failed"),
        }
        match self.queue.next(self.worker.app_name(), QueueKind::Inbound).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(app = self.worker.app_name(), error = %e, "inbound queue poll failed");
                None
            }
        }
    }

    /// Forwards a completed Task to wherever `route_target` says it
    /// belongs next. A target of `""` means the Task is terminal here —
    /// dropped, per rule 4 of `spec.md` §4.3.
    async fn route_task(&self, task: Task) {
        let target = route_target(&task.app_name, self.worker.app_name(), self.worker.app_type());
        if target.is_empty() {
            debug!(task_id = %task.id, app = self.worker.app_name(), "task terminal, not routed further");
            return;
        }
        if let Err(e) = self.queue.publish(target, QueueKind::Inbound, &task).await {
            error!(task_id = %task.id, target, error = %e, "failed to publish routed task");
        }
    }

    /// Runs exactly one Idle -> ... -> Idle cycle. Returns `true` if a
    /// Task was dequeued and processed, `false` if the queue was empty
    /// (the caller should then sleep `idle_sleep`).
    pub async fn run_cycle(&self) -> bool {
        let (task, ack) = match self.next_task().await {
            Some(pair) => pair,
            None => return false,
        };

        let task_id = task.id.clone();
        debug!(task_id = %task_id, app = self.worker.app_name(), action = %task.action, "processing task");
        let processed = self.worker.run_task(task).await;
        let succeeded = processed.succeeded();

        {
            let mut status = self.status.lock().expect("runner status mutex poisoned");
            status.cycles += 1;
            status.tasks_run += 1;
            if !succeeded {
                status.tasks_failed += 1;
                status.last_error = processed.last_result().and_then(|r| r.message.clone());
            }
        }

        self.route_task(processed).await;

        // Acked only now that the Task has been run and routed onward —
        // a crash before this point leaves the message unacked and
        // JetStream redelivers it rather than dropping it silently.
        if let Err(e) = ack.ack().await {
            error!(task_id = %task_id, app = self.worker.app_name(), error = %e, "failed to ack processed task");
        }
        true
    }

    /// Runs until `shutdown_flag()` is set, checked only between cycles.
    pub async fn run(&self) {
        info!(app = self.worker.app_name(), "starting AppRunner");
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!(app = self.worker.app_name(), "shutdown requested, exiting after current cycle");
                break;
            }
            if !self.run_cycle().await {
                tokio::time::sleep(self.idle_sleep).await;
            }
        }
    }
}
