//! Configuration model.
//!
//! `RootConfig` mirrors `config.toml`; every section is defaulted so a partial
//! or empty file is always valid. `RuntimeEnv` carries the environment
//! overrides that are read once at startup and injected into services.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Default host port models are published on.
pub const DEFAULT_HOST_PORT: u16 = 8001;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RootConfig {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub health: HealthSettings,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Model started when no explicit id is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model_id: Option<String>,
    #[serde(default = "default_host_port")]
    pub host_port: u16,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            current_model_id: None,
            host_port: DEFAULT_HOST_PORT,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl StorageSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct QueueSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Token budget passed to every completion request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HealthSettings {
    /// Sleep between two liveness probes.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Number of container log lines surfaced when a probe fails.
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            log_lines: default_log_lines(),
        }
    }
}

fn default_host_port() -> u16 {
    DEFAULT_HOST_PORT
}

fn default_flush_interval_secs() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_log_lines() -> usize {
    100
}

/// Environment overrides that influence how models are launched and reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnv {
    /// Host-side path of the config folder when berth itself runs in a container.
    pub host_folder: Option<String>,
    pub gpu_enabled: bool,
    /// GPU platform name, e.g. `cuda`.
    pub gpu_platform: Option<String>,
    /// Overrides the host reported by the container gateway.
    pub llm_host: Option<String>,
}

impl RuntimeEnv {
    pub const HOST_FOLDER: &'static str = "BERTH_HOST_FOLDER";
    pub const GPU_ENABLED: &'static str = "BERTH_GPU_ENABLED";
    pub const GPU_PLATFORM: &'static str = "BERTH_GPU_PLATFORM";
    pub const LLM_HOST: &'static str = "BERTH_LLM_HOST";

    /// Reads the overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the overrides from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            host_folder: get(Self::HOST_FOLDER),
            gpu_enabled: get(Self::GPU_ENABLED).as_deref() == Some("true"),
            gpu_platform: get(Self::GPU_PLATFORM),
            llm_host: get(Self::LLM_HOST),
        }
    }
}

/// Read access to the configuration collaborator.
pub trait ConfigProvider: Send + Sync {
    /// Returns the current configuration.
    fn get_config(&self) -> Result<RootConfig>;

    /// Directory holding `config.toml` and every persisted collection.
    fn config_directory(&self) -> &Path;

    /// Convenience accessor for the default model id.
    fn current_model_id(&self) -> Result<Option<String>> {
        Ok(self.get_config()?.model.current_model_id)
    }
}

/// A fixed configuration, handy for tests and one-shot commands.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub config: RootConfig,
    pub directory: PathBuf,
}

impl ConfigProvider for StaticConfig {
    fn get_config(&self) -> Result<RootConfig> {
        Ok(self.config.clone())
    }

    fn config_directory(&self) -> &Path {
        &self.directory
    }
}
