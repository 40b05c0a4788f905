//! Main configuration (TOML) and the separate secrets file, per `spec.md`
//! §6. Mirrors the teacher's `FluxConfig` pattern: one `#[derive(Deserialize)]`
//! struct per section, `#[serde(default)]` everywhere, loaded with
//! `toml::from_str`.

pub mod secrets;

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub use crate::nats::NatsConfig;
pub use crate::snapshot::config::SnapshotConfig;
pub use secrets::{DiscogsSecret, LastfmSecret, SecretsFile};

/// Top-level Sonicat configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SonicatConfig {
    /// Root directory: `data/`, `log/`, `config/` all live under here.
    pub sonicat_path: PathBuf,

    #[serde(default)]
    pub catalogs: HashMap<String, CatalogConfig>,

    #[serde(default)]
    pub apps: HashMap<String, HashMap<String, AppConfig>>,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPaths {
    pub managed: PathBuf,
    pub intake: PathBuf,
    #[serde(default)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerTaskConfig {
    pub actions: Vec<String>,
}

/// `tasks: { <type>: { <app>: { actions: [...] } } }` for one catalog.
pub type CatalogTaskConfig = HashMap<String, HashMap<String, WorkerTaskConfig>>;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub moniker: String,
    pub path: CatalogPaths,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub tasks: CatalogTaskConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub moniker: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_idle_sleep_seconds")]
    pub idle_sleep_seconds: u64,
    #[serde(default)]
    pub threshold: usize,
}

fn default_idle_sleep_seconds() -> u64 {
    5
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            idle_sleep_seconds: default_idle_sleep_seconds(),
            threshold: 0,
        }
    }
}

impl SonicatConfig {
    pub fn catalog_names(&self) -> Vec<String> {
        self.catalogs.keys().cloned().collect()
    }

    pub fn data_dir(&self, subdir: &str) -> PathBuf {
        self.sonicat_path.join("data").join(subdir)
    }

    pub fn log_dir(&self, worker_type: &str) -> PathBuf {
        self.sonicat_path.join("log").join(worker_type)
    }

    pub fn temp_dir(&self, worker_moniker: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/sonicat-{}", worker_moniker))
    }
}

pub fn load_config(path: &str) -> Result<SonicatConfig, crate::error::SonicatError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| crate::error::SonicatError::Config(format!("cannot read {}: {}", path, e)))?;
    toml::from_str(&contents).map_err(|e| crate::error::SonicatError::Config(format!("invalid config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_config() {
        let toml = r#"
            sonicat_path = "/srv/sonicat"

            [catalogs.samples]
            moniker = "Samples"
            path = { managed = "/srv/sonicat/managed", intake = "/srv/sonicat/intake" }

            [catalogs.samples.tasks.analysis.librosa]
            actions = ["basic"]
        "#;
        let config: SonicatConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.catalog_names(), vec!["samples".to_string()]);
        let catalog = &config.catalogs["samples"];
        assert_eq!(catalog.moniker, "Samples");
        assert_eq!(catalog.log_level, "info");
        assert_eq!(catalog.tasks["analysis"]["librosa"].actions, vec!["basic".to_string()]);
    }

    #[test]
    fn tasks_config_defaults() {
        let config = TasksConfig::default();
        assert_eq!(config.idle_sleep_seconds, 5);
        assert_eq!(config.threshold, 0);
    }
}
