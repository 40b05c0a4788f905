mod client;
mod queue;

pub use client::{NatsClient, NatsConfig};
pub use queue::{PendingAck, QueueKind, TaskQueue};
