pub mod chat_service;
pub mod config_service;
pub mod docker_gateway;
pub mod download_registry;
pub mod firehose;
pub mod llm_client;
pub mod model_catalog;
pub mod paths;
pub mod storage;

pub use crate::chat_service::StateChatService;
pub use crate::config_service::ConfigService;
pub use crate::docker_gateway::DockerCliGateway;
pub use crate::download_registry::StateDownloadRegistry;
pub use crate::firehose::BroadcastFirehose;
pub use crate::llm_client::HttpLlmClient;
pub use crate::model_catalog::StateModelRepository;
pub use crate::paths::{BerthPaths, ServiceType};
pub use crate::storage::{Flushable, StateFile};
