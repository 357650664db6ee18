//! Model Lifecycle Controller.
//!
//! Resolves which model to run, maps its downloaded assets into a container,
//! launches it through the container gateway and watches the published port
//! until the model answers.

mod health;
pub mod launch;
mod runtime;

pub use health::{probe, reachable_host};
pub use launch::{LaunchPlan, plan_launch, translate_windows_path};
pub use runtime::{ModelRuntimeState, RuntimeStateTable};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use berth_core::config::{ConfigProvider, HealthSettings, RootConfig, RuntimeEnv};
use berth_core::container::ContainerGateway;
use berth_core::download::DownloadService;
use berth_core::error::{BerthError, Result};
use berth_core::model::{Model, ModelController, ModelRepository, ModelStatus};

use health::HealthCheck;

pub struct ModelService {
    config: Arc<dyn ConfigProvider>,
    models: Arc<dyn ModelRepository>,
    downloads: Arc<dyn DownloadService>,
    gateway: Arc<dyn ContainerGateway>,
    env: RuntimeEnv,
    runtime: Arc<RuntimeStateTable>,
    token: CancellationToken,
}

impl ModelService {
    /// Health-check loops spawned by this service stop when `token` is cancelled.
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        models: Arc<dyn ModelRepository>,
        downloads: Arc<dyn DownloadService>,
        gateway: Arc<dyn ContainerGateway>,
        env: RuntimeEnv,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            models,
            downloads,
            gateway,
            env,
            runtime: Arc::new(RuntimeStateTable::new()),
            token,
        }
    }

    pub fn runtime(&self) -> Arc<RuntimeStateTable> {
        Arc::clone(&self.runtime)
    }

    /// Starts `model_id`, or the configured default model when it is empty.
    pub async fn start(&self, model_id: &str) -> Result<()> {
        let config = self.config.get_config()?;
        let model_id = resolve_model_id(model_id, &config)?;

        let model = self
            .models
            .find_by_id(&model_id)
            .await?
            .ok_or_else(|| BerthError::not_found("Model", model_id.as_str()))?;

        let assets = self.resolve_assets(&model).await?;
        let plan = plan_launch(&model, &assets, self.config.config_directory(), &self.env);

        tracing::info!(
            model_id = %model.id,
            image = %plan.image,
            port = config.model.host_port,
            "[ModelService] Launching model container"
        );
        let info = self
            .gateway
            .launch_container(&plan.image, plan.container_port, config.model.host_port, &plan.options)
            .await
            .map_err(|e| BerthError::container(format!("failed to launch container: {e}")))?;

        let state = self.runtime.get_or_insert(info.host_port);
        if info.new_container_started {
            state.set_answering(false);
        } else if state.is_answering() {
            tracing::debug!(model_id = %model.id, port = info.host_port, "[ModelService] Model already answering");
            return Ok(());
        }

        self.spawn_health_check(model.id, info.host_port, state, config.health);
        Ok(())
    }

    /// Reports container and liveness state of `model_id` (or the default model).
    pub async fn status(&self, model_id: &str) -> Result<ModelStatus> {
        let config = self.config.get_config()?;
        let model_id = resolve_model_id(model_id, &config)?;
        let port = config.model.host_port;

        if !self.gateway.hash_is_running(&model_id).await? {
            return Ok(ModelStatus::default());
        }

        let answering = self
            .runtime
            .get(port)
            .is_some_and(|state| state.is_answering());
        let host = reachable_host(self.env.llm_host.as_deref(), &self.gateway.docker_host());
        let address = if host.is_empty() {
            String::new()
        } else {
            format!("{host}:{port}")
        };

        Ok(ModelStatus {
            running: true,
            answering,
            address,
        })
    }

    /// Local file path of every asset, keyed by its environment variable name.
    async fn resolve_assets(&self, model: &Model) -> Result<Vec<(String, String)>> {
        let mut assets = Vec::with_capacity(model.assets.len());
        for (name, url) in &model.assets {
            let download = self
                .downloads
                .get_download(url)
                .await?
                .ok_or_else(|| BerthError::AssetMissing {
                    asset: name.clone(),
                    url: url.clone(),
                })?;
            assets.push((name.clone(), download.file_path));
        }
        Ok(assets)
    }

    fn spawn_health_check(
        &self,
        model_id: String,
        port: u16,
        state: Arc<ModelRuntimeState>,
        settings: HealthSettings,
    ) {
        let Some(check) = HealthCheck::claim(
            model_id.clone(),
            port,
            Arc::clone(&self.gateway),
            self.env.llm_host.clone(),
            settings,
            state,
        ) else {
            tracing::debug!(%model_id, port, "[ModelService] Health check already running");
            return;
        };

        tracing::debug!(%model_id, port, "[ModelService] Starting health check");
        tokio::spawn(check.run(self.token.child_token()));
    }
}

#[async_trait]
impl ModelController for ModelService {
    async fn start_model(&self, model_id: &str) -> Result<()> {
        self.start(model_id).await
    }

    async fn model_status(&self, model_id: &str) -> Result<ModelStatus> {
        self.status(model_id).await
    }
}

fn resolve_model_id(model_id: &str, config: &RootConfig) -> Result<String> {
    if !model_id.is_empty() {
        return Ok(model_id.to_string());
    }
    config
        .model
        .current_model_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BerthError::not_found("Model", "<default>"))
}
