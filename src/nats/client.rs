use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream};
use serde::Deserialize;
use tracing::info;

/// NATS configuration for the task queue stream.
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    #[serde(default = "default_stream_subjects")]
    pub stream_subjects: Vec<String>,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i64,
}

fn default_stream_subjects() -> Vec<String> {
    vec!["sonicat.>".to_string()]
}

fn default_max_age_days() -> i64 {
    7
}

fn default_max_bytes() -> i64 {
    10 * 1024 * 1024 * 1024 // 10GB
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream_name: "SONICAT_TASKS".to_string(),
            stream_subjects: default_stream_subjects(),
            max_age_days: default_max_age_days(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// NATS client with the single JetStream stream backing all three logical
/// queues (command/inbound/outbound) for every worker role, namespaced by
/// subject (`sonicat.<role>.<queue>`) rather than by separate streams.
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!(url = %config.url, "connecting to NATS");

        let client = async_nats::connect(&config.url).await.context("failed to connect to NATS")?;
        let jetstream = jetstream::new(client.clone());

        let nats_client = Self { client, jetstream, config };
        nats_client.ensure_stream().await?;

        Ok(nats_client)
    }

    async fn ensure_stream(&self) -> Result<()> {
        info!(stream = %self.config.stream_name, "ensuring JetStream stream exists");

        if self.jetstream.get_stream(&self.config.stream_name).await.is_ok() {
            info!(stream = %self.config.stream_name, "stream already exists");
            return Ok(());
        }

        let stream_config = stream::Config {
            name: self.config.stream_name.clone(),
            subjects: self.config.stream_subjects.clone(),
            max_age: std::time::Duration::from_secs((self.config.max_age_days * 86400) as u64),
            max_bytes: self.config.max_bytes,
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        self.jetstream.create_stream(stream_config).await.context("failed to create JetStream stream")?;
        info!(stream = %self.config.stream_name, "created JetStream stream");
        Ok(())
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}
