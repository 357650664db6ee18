//! End-to-end prompt processing through the public API, with the container
//! runtime and the inference server replaced by in-process fakes.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use berth_application::{ModelService, PromptService};
use berth_core::chat::{ChatService, ChatThread};
use berth_core::config::{RootConfig, RuntimeEnv, StaticConfig};
use berth_core::container::{ContainerGateway, LaunchInfo, LaunchOptions};
use berth_core::download::{Download, DownloadService};
use berth_core::error::Result;
use berth_core::event::{Event, EventPublisher};
use berth_core::llm::{CompletionRequest, CompletionResponse, CompletionStream, LlmClient};
use berth_core::model::{Model, ModelRepository};
use berth_core::prompt::{Prompt, PromptStatus};
use berth_infrastructure::paths::BerthPaths;
use berth_infrastructure::{StateChatService, StateFile};

struct Gateway {
    running: AtomicBool,
}

#[async_trait]
impl ContainerGateway for Gateway {
    async fn launch_container(
        &self,
        _image: &str,
        _container_port: u16,
        host_port: u16,
        _options: &LaunchOptions,
    ) -> Result<LaunchInfo> {
        Ok(LaunchInfo {
            new_container_started: false,
            host_port,
        })
    }

    async fn hash_is_running(&self, _model_id: &str) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn container_logs_and_status(&self, _model_id: &str, _lines: usize) -> Result<String> {
        Ok(String::new())
    }

    fn docker_host(&self) -> String {
        "10.0.0.5".to_string()
    }
}

struct NoModels;

#[async_trait]
impl ModelRepository for NoModels {
    async fn find_by_id(&self, _model_id: &str) -> Result<Option<Model>> {
        Ok(None)
    }

    async fn list(&self) -> Result<Vec<Model>> {
        Ok(Vec::new())
    }
}

struct NoDownloads;

#[async_trait]
impl DownloadService for NoDownloads {
    async fn get_download(&self, _url: &str) -> Result<Option<Download>> {
        Ok(None)
    }
}

#[derive(Default)]
struct Llm {
    requests: Mutex<Vec<(String, CompletionRequest)>>,
}

#[async_trait]
impl LlmClient for Llm {
    async fn stream_completions(
        &self,
        address: &str,
        request: CompletionRequest,
    ) -> Result<CompletionStream> {
        self.requests
            .lock()
            .unwrap()
            .push((address.to_string(), request));
        let chunks = vec![
            Ok(CompletionResponse::chunk("The answer", None)),
            Ok(CompletionResponse::chunk(" is 42.", Some("stop"))),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<Event>>);

impl EventPublisher for Events {
    fn publish(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl Events {
    fn started(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::PromptProcessingStarted { prompt_id } => Some(prompt_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn finished(&self) -> Vec<(String, String)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::PromptProcessingFinished { prompt_id, error } => {
                    Some((prompt_id.clone(), error.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

struct Harness {
    _dir: TempDir,
    prompts: Arc<PromptService>,
    chat: Arc<StateChatService>,
    events: Arc<Events>,
    llm: Arc<Llm>,
}

async fn harness(running: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let paths = BerthPaths::new(Some(dir.path())).unwrap();
    let events = Arc::new(Events::default());

    let chat = Arc::new(StateChatService::open(&paths, events.clone()).unwrap());
    chat.add_chat_thread(ChatThread::new("t1", "Questions")).await.unwrap();

    let mut config = RootConfig::default();
    config.model.host_port = 8000;
    let models = Arc::new(ModelService::new(
        Arc::new(StaticConfig {
            config,
            directory: PathBuf::from(dir.path()),
        }),
        Arc::new(NoModels),
        Arc::new(NoDownloads),
        Arc::new(Gateway {
            running: AtomicBool::new(running),
        }),
        RuntimeEnv::default(),
        CancellationToken::new(),
    ));
    models.runtime().get_or_insert(8000).set_answering(true);

    let llm = Arc::new(Llm::default());
    let store = Arc::new(StateFile::open("prompts", paths.state_file(berth_infrastructure::ServiceType::Prompts)).unwrap());
    let prompts = Arc::new(PromptService::new(
        store,
        chat.clone(),
        models,
        llm.clone(),
        events.clone(),
        Default::default(),
    ));

    Harness {
        _dir: dir,
        prompts,
        chat,
        events,
        llm,
    }
}

#[tokio::test]
async fn prompt_completes_against_answering_model() {
    let h = harness(true).await;
    h.prompts
        .add_prompt(Prompt::new("t1", "m1", "What is the answer?", "Q: What is the answer?").with_id("p1"))
        .unwrap();

    let processed = h.prompts.process_next_prompt().await.unwrap();
    assert_eq!(processed.as_deref(), Some("p1"));

    let prompt = h.prompts.get_prompt("p1").unwrap();
    assert_eq!(prompt.status, PromptStatus::Completed);
    assert_eq!(prompt.run_count, 1);

    let requests = h.llm.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "http://10.0.0.5:8000");
    assert_eq!(requests[0].1.prompt, "Q: What is the answer?");
    assert!(requests[0].1.stream);
    assert_eq!(requests[0].1.max_tokens, 4096);

    let messages = h.chat.get_chat_messages("t1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "p1");
    assert!(messages[0].is_user_message);
    assert_eq!(messages[0].content, "What is the answer?");
    assert!(!messages[1].is_user_message);
    assert_eq!(messages[1].content, "The answer is 42.");

    assert_eq!(h.events.started(), vec!["p1".to_string()]);
    assert_eq!(h.events.finished(), vec![("p1".to_string(), String::new())]);
}

#[tokio::test]
async fn prompt_errors_when_model_is_not_running() {
    let h = harness(false).await;
    h.prompts
        .add_prompt(Prompt::new("t1", "m1", "Hello?", "Hello?").with_id("p1"))
        .unwrap();

    assert!(h.prompts.process_next_prompt().await.is_err());

    let prompt = h.prompts.get_prompt("p1").unwrap();
    assert_eq!(prompt.status, PromptStatus::Errored);
    assert!(prompt.error.contains("m1"));

    let messages = h.chat.get_chat_messages("t1").await.unwrap();
    assert!(messages.iter().all(|m| m.is_user_message));
    assert!(h.llm.requests.lock().unwrap().is_empty());

    let finished = h.events.finished();
    assert_eq!(finished.len(), 1);
    assert!(!finished[0].1.is_empty());
}

#[tokio::test]
async fn live_subscribers_see_every_chunk() {
    let h = harness(true).await;
    let mut rx = h.prompts.streams().subscribe("t1");
    h.prompts
        .add_prompt(Prompt::new("t1", "m1", "Hi", "Hi").with_id("p1"))
        .unwrap();

    h.prompts.process_next_prompt().await.unwrap();

    assert_eq!(rx.recv().await.unwrap().choices[0].text, "The answer");
    assert!(rx.recv().await.unwrap().is_stop());
}

#[tokio::test]
async fn prompts_survive_a_restart_and_are_recovered() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prompts.json");
    {
        let store = StateFile::<Vec<Prompt>>::open("prompts", &path).unwrap();
        let mut running = Prompt::new("t1", "m1", "Hi", "Hi").with_id("p1");
        running.status = PromptStatus::Running;
        store.replace(vec![running]);
        store.save().unwrap();
    }

    let h = harness(true).await;
    let store = Arc::new(StateFile::<Vec<Prompt>>::open("prompts", &path).unwrap());
    let service = PromptService::new(
        store,
        h.chat.clone(),
        Arc::new(ModelServiceStub),
        h.llm.clone(),
        h.events.clone(),
        Default::default(),
    );

    assert_eq!(service.recover_interrupted(), 1);
    assert_eq!(service.get_prompt("p1").unwrap().status, PromptStatus::Errored);
}

struct ModelServiceStub;

#[async_trait]
impl berth_core::model::ModelController for ModelServiceStub {
    async fn start_model(&self, _model_id: &str) -> Result<()> {
        Ok(())
    }

    async fn model_status(&self, _model_id: &str) -> Result<berth_core::model::ModelStatus> {
        Ok(Default::default())
    }
}
