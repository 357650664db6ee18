//! Wiring of stores, collaborators and services for one berth process.

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use berth_application::{ModelService, PromptService};
use berth_core::chat::{ChatMessage, ChatThread};
use berth_core::config::{ConfigProvider, RootConfig, RuntimeEnv};
use berth_core::download::Download;
use berth_core::model::Model;
use berth_core::prompt::Prompt;
use berth_execution::Supervisor;
use berth_infrastructure::paths::{BerthPaths, ServiceType};
use berth_infrastructure::{
    BroadcastFirehose, ConfigService, DockerCliGateway, HttpLlmClient, StateChatService,
    StateDownloadRegistry, StateFile, StateModelRepository,
};

pub struct AppContext {
    pub config: Arc<ConfigService>,
    pub root_config: RootConfig,
    pub model_service: Arc<ModelService>,
    pub prompt_service: Arc<PromptService>,
    prompts: Arc<StateFile<Vec<Prompt>>>,
    threads: Arc<StateFile<Vec<ChatThread>>>,
    messages: Arc<StateFile<Vec<ChatMessage>>>,
    downloads: Arc<StateFile<Vec<Download>>>,
    models: Arc<StateFile<Vec<Model>>>,
}

impl AppContext {
    /// Loads configuration and every persisted collection. Background loops
    /// started by the services stop when `token` is cancelled.
    pub fn open(paths: BerthPaths, token: CancellationToken) -> Result<Self> {
        let config = Arc::new(ConfigService::new(paths.clone()));
        let root_config = config.get_config().context("failed to load config.toml")?;
        let env = RuntimeEnv::from_env();

        let prompts = open_store::<Vec<Prompt>>(&paths, ServiceType::Prompts)?;
        let threads = open_store::<Vec<ChatThread>>(&paths, ServiceType::ChatThreads)?;
        let messages = open_store::<Vec<ChatMessage>>(&paths, ServiceType::ChatMessages)?;
        let downloads = open_store::<Vec<Download>>(&paths, ServiceType::Downloads)?;
        let models = open_store::<Vec<Model>>(&paths, ServiceType::Models)?;

        let firehose = Arc::new(BroadcastFirehose::default());
        let chat = Arc::new(StateChatService::new(
            Arc::clone(&threads),
            Arc::clone(&messages),
            firehose.clone(),
        ));

        let model_service = Arc::new(ModelService::new(
            config.clone(),
            Arc::new(StateModelRepository::new(Arc::clone(&models))),
            Arc::new(StateDownloadRegistry::new(Arc::clone(&downloads))),
            Arc::new(DockerCliGateway::new()),
            env,
            token,
        ));

        let prompt_service = Arc::new(PromptService::new(
            Arc::clone(&prompts),
            chat,
            model_service.clone(),
            Arc::new(HttpLlmClient::new()),
            firehose,
            root_config.queue.clone(),
        ));

        Ok(Self {
            config,
            root_config,
            model_service,
            prompt_service,
            prompts,
            threads,
            messages,
            downloads,
            models,
        })
    }

    /// Starts a flush loop for every collection and registers each one for
    /// the final flush on shutdown.
    pub fn supervise_stores(&self, supervisor: &Supervisor) {
        supervise(supervisor, &self.prompts, &self.root_config);
        supervise(supervisor, &self.threads, &self.root_config);
        supervise(supervisor, &self.messages, &self.root_config);
        supervise(supervisor, &self.downloads, &self.root_config);
        supervise(supervisor, &self.models, &self.root_config);
    }
}

fn open_store<T>(paths: &BerthPaths, service: ServiceType) -> Result<Arc<StateFile<T>>>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    let path = paths.state_file(service);
    let store = StateFile::open(service.key(), &path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(Arc::new(store))
}

fn supervise<T>(supervisor: &Supervisor, store: &Arc<StateFile<T>>, config: &RootConfig)
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    let interval = config.storage.flush_interval();
    let key = berth_infrastructure::Flushable::key(store.as_ref()).to_string();
    supervisor.register_flush(store.clone());
    supervisor.spawn(
        format!("flush:{key}"),
        Arc::clone(store).run_periodic_flush(interval, supervisor.token().child_token()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_config_and_collections() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BerthPaths::new(Some(temp_dir.path())).unwrap();

        let ctx = AppContext::open(paths.clone(), CancellationToken::new()).unwrap();

        assert!(paths.config_file().exists());
        for service in [
            ServiceType::Prompts,
            ServiceType::ChatThreads,
            ServiceType::ChatMessages,
            ServiceType::Downloads,
            ServiceType::Models,
        ] {
            assert!(paths.state_file(service).exists());
        }
        assert!(ctx.prompt_service.list_prompts().is_empty());
        assert_eq!(ctx.root_config, RootConfig::default());
    }

    #[test]
    fn test_open_fails_on_corrupt_collection() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BerthPaths::new(Some(temp_dir.path())).unwrap();
        std::fs::write(paths.state_file(ServiceType::Prompts), "[broken").unwrap();

        assert!(AppContext::open(paths, CancellationToken::new()).is_err());
    }
}
