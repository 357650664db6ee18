//! Container runtime gateway contract.
//!
//! The gateway owns the container runtime. Launching is idempotent: asking
//! for a configuration that is already running must not create a duplicate
//! container, which is reported through `LaunchInfo::new_container_started`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Extra launch parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    /// Model the container serves; used to find it again later.
    pub model_id: String,
    /// `NAME=value` pairs.
    #[serde(default)]
    pub envs: Vec<String>,
    /// `host_path:container_path` pairs.
    #[serde(default)]
    pub host_binds: Vec<String>,
    #[serde(default)]
    pub gpu_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchInfo {
    pub new_container_started: bool,
    pub host_port: u16,
}

#[async_trait]
pub trait ContainerGateway: Send + Sync {
    async fn launch_container(
        &self,
        image: &str,
        container_port: u16,
        host_port: u16,
        options: &LaunchOptions,
    ) -> Result<LaunchInfo>;

    /// Whether a container for the model is currently running.
    async fn hash_is_running(&self, model_id: &str) -> Result<bool>;

    /// The last `lines` lines of the model container's output plus its state.
    async fn container_logs_and_status(&self, model_id: &str, lines: usize) -> Result<String>;

    /// Host the container runtime publishes ports on.
    fn docker_host(&self) -> String;
}
