use crate::task::Task;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer};
use futures::StreamExt;
use tracing::debug;

/// The unacked handle a [`TaskQueue::next`] caller holds alongside the
/// Task it dequeued. `ack()` is deferred to the caller so a crash between
/// fetch and "work finished" leaves the message unacked — JetStream
/// redelivers it to whichever worker picks the role back up next.
/// Acking eagerly on fetch (the prior behavior) would drop the Task at
/// the queue layer on such a crash; recovery would then depend entirely
/// on the scheduler's ledger-based `make_tasks` reconciliation noticing
/// the asset never completed, which still happens but only on the next
/// full enumeration pass rather than via the queue's own redelivery.
pub struct PendingAck(jetstream::Message);

impl PendingAck {
    pub async fn ack(self) -> Result<()> {
        self.0.ack().await.map_err(|e| anyhow::anyhow!("failed to ack message: {}", e))
    }
}

/// One of the three logical queues every worker role has, per `spec.md`
/// §5: `command` (scheduler control messages), `inbound` (tasks awaiting
/// processing), `outbound` (completed tasks awaiting routing).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Command,
    Inbound,
    Outbound,
}

impl QueueKind {
    fn as_str(self) -> &'static str {
        match self {
            QueueKind::Command => "command",
            QueueKind::Inbound => "inbound",
            QueueKind::Outbound => "outbound",
        }
    }
}

fn subject(role: &str, kind: QueueKind) -> String {
    format!("sonicat.{}.{}", role, kind.as_str())
}

fn durable_name(role: &str, kind: QueueKind) -> String {
    format!("{}-{}", role, kind.as_str())
}

/// A typed handle onto one role's three queues, backed by the shared
/// JetStream stream. Each worker process and the Tasks scheduler hold one
/// of these per role they touch.
#[derive(Clone)]
pub struct TaskQueue {
    jetstream: jetstream::Context,
    stream_name: String,
}

impl TaskQueue {
    pub fn new(jetstream: jetstream::Context, stream_name: impl Into<String>) -> Self {
        Self { jetstream, stream_name: stream_name.into() }
    }

    /// Publishes `task` onto `role`'s `kind` queue. At-least-once: the
    /// call only returns once JetStream has acked the publish.
    pub async fn publish(&self, role: &str, kind: QueueKind, task: &Task) -> Result<()> {
        let subject = subject(role, kind);
        let payload = serde_json::to_vec(task).context("failed to serialize task")?;

        debug!(task_id = %task.id, %subject, "publishing task");

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("failed to publish task to '{}'", subject))?
            .await
            .context("failed to await publish ack")?;

        Ok(())
    }

    /// Pulls the next task off `role`'s `kind` queue. The message is left
    /// unacked — at-least-once delivery — until the caller explicitly
    /// acks the returned [`PendingAck`] once it has finished (or routed)
    /// the Task, so a crash mid-processing redelivers rather than
    /// silently dropping it.
    pub async fn next(&self, role: &str, kind: QueueKind) -> Result<Option<(Task, PendingAck)>> {
        let consumer: PullConsumer = self
            .jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    durable_name: Some(durable_name(role, kind)),
                    filter_subject: subject(role, kind),
                    ..Default::default()
                },
                &self.stream_name,
            )
            .await
            .context("failed to create/attach pull consumer")?;

        let mut messages = consumer.fetch().max_messages(1).messages().await.context("failed to fetch messages")?;

        match messages.next().await {
            Some(Ok(message)) => {
                let task: Task = serde_json::from_slice(&message.payload).context("failed to deserialize task")?;
                debug!(task_id = %task.id, %role, "dequeued task, ack deferred until processed");
                Ok(Some((task, PendingAck(message))))
            }
            Some(Err(e)) => Err(anyhow::anyhow!("error pulling message: {}", e)),
            None => Ok(None),
        }
    }
}
