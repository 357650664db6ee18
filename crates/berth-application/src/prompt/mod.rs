//! Prompt Queue Processor.
//!
//! Prompts are processed strictly one at a time. A scheduling pass runs on a
//! fixed interval or when a new prompt wakes the loop, takes the run lock,
//! and processes the oldest queued prompt while holding it.

pub mod render;
mod stream;

pub use render::{escape_html, llm_response_to_text};
pub use stream::StreamManager;

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use berth_core::chat::{ChatMessage, ChatService};
use berth_core::config::QueueSettings;
use berth_core::error::{BerthError, Result};
use berth_core::event::{Event, EventPublisher};
use berth_core::llm::{CompletionRequest, LlmClient};
use berth_core::model::ModelController;
use berth_core::prompt::{Prompt, PromptStatus};
use berth_infrastructure::storage::StateFile;

const INTERRUPTED_ERROR: &str = "prompt was interrupted by a restart";

pub struct PromptService {
    prompts: Arc<StateFile<Vec<Prompt>>>,
    chat: Arc<dyn ChatService>,
    models: Arc<dyn ModelController>,
    llm: Arc<dyn LlmClient>,
    events: Arc<dyn EventPublisher>,
    streams: Arc<StreamManager>,
    settings: QueueSettings,
    run_lock: Mutex<()>,
    trigger: Notify,
}

impl PromptService {
    pub fn new(
        prompts: Arc<StateFile<Vec<Prompt>>>,
        chat: Arc<dyn ChatService>,
        models: Arc<dyn ModelController>,
        llm: Arc<dyn LlmClient>,
        events: Arc<dyn EventPublisher>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            prompts,
            chat,
            models,
            llm,
            events,
            streams: Arc::new(StreamManager::new()),
            settings,
            run_lock: Mutex::new(()),
            trigger: Notify::new(),
        }
    }

    pub fn streams(&self) -> Arc<StreamManager> {
        Arc::clone(&self.streams)
    }

    /// Enqueues `prompt` and wakes the scheduler.
    pub fn add_prompt(&self, mut prompt: Prompt) -> Result<Prompt> {
        if prompt.thread_id.is_empty() {
            return Err(BerthError::validation("prompt thread id must not be empty"));
        }
        if prompt.model_id.is_empty() {
            return Err(BerthError::validation("prompt model id must not be empty"));
        }
        if prompt.id.is_empty() {
            prompt.id = uuid::Uuid::new_v4().to_string();
        }
        if prompt.created_at.is_empty() {
            prompt.created_at = chrono::Utc::now().to_rfc3339();
        }
        prompt.status = PromptStatus::Queued;
        prompt.error.clear();

        let duplicate = self.prompts.update(|prompts| {
            if prompts.iter().any(|p| p.id == prompt.id) {
                return true;
            }
            prompts.push(prompt.clone());
            false
        });
        if duplicate {
            return Err(BerthError::validation(format!("prompt '{}' already exists", prompt.id)));
        }

        tracing::info!(prompt_id = %prompt.id, thread_id = %prompt.thread_id, "[PromptService] Prompt queued");
        self.events.publish(Event::PromptAdded {
            prompt_id: prompt.id.clone(),
        });
        self.trigger();
        Ok(prompt)
    }

    /// Prompts in enqueue order.
    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts.snapshot()
    }

    pub fn get_prompt(&self, prompt_id: &str) -> Result<Prompt> {
        self.prompts
            .read(|prompts| prompts.iter().find(|p| p.id == prompt_id).cloned())
            .ok_or_else(|| BerthError::not_found("Prompt", prompt_id))
    }

    /// Puts a finished prompt back in the queue under the same id. A requeue
    /// counts as a new enqueue: the prompt moves behind every prompt already
    /// in the collection.
    pub fn requeue_prompt(&self, prompt_id: &str) -> Result<Prompt> {
        let requeued = self.prompts.update(|prompts| -> Result<Prompt> {
            let index = prompts
                .iter()
                .position(|p| p.id == prompt_id)
                .ok_or_else(|| BerthError::not_found("Prompt", prompt_id))?;
            if !prompts[index].status.is_terminal() {
                return Err(BerthError::validation(format!(
                    "prompt '{}' is {} and cannot be requeued",
                    prompt_id, prompts[index].status
                )));
            }
            let mut prompt = prompts.remove(index);
            prompt.status = PromptStatus::Queued;
            prompt.error.clear();
            prompts.push(prompt.clone());
            Ok(prompt)
        })?;

        tracing::info!(prompt_id, run_count = requeued.run_count, "[PromptService] Prompt requeued");
        self.trigger();
        Ok(requeued)
    }

    pub fn remove_prompt(&self, prompt_id: &str) -> Result<()> {
        self.prompts.update(|prompts| -> Result<()> {
            let index = prompts
                .iter()
                .position(|p| p.id == prompt_id)
                .ok_or_else(|| BerthError::not_found("Prompt", prompt_id))?;
            if prompts[index].status == PromptStatus::Running {
                return Err(BerthError::validation(format!(
                    "prompt '{prompt_id}' is running and cannot be removed"
                )));
            }
            prompts.remove(index);
            Ok(())
        })
    }

    /// Marks prompts left `Running` by a previous process as `Errored`.
    /// Returns how many were recovered.
    pub fn recover_interrupted(&self) -> usize {
        let recovered = self.prompts.read(|prompts| {
            prompts.iter().filter(|p| p.status == PromptStatus::Running).count()
        });
        if recovered == 0 {
            return 0;
        }

        self.prompts.update(|prompts| {
            for prompt in prompts.iter_mut().filter(|p| p.status == PromptStatus::Running) {
                prompt.status = PromptStatus::Errored;
                prompt.error = INTERRUPTED_ERROR.to_string();
            }
        });
        tracing::warn!(recovered, "[PromptService] Recovered interrupted prompts");
        recovered
    }

    /// Wakes the scheduling loop.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Scheduling loop; runs until `token` is cancelled. A generation in
    /// progress is finished before the loop observes cancellation.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("[PromptService] Scheduler started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
            }

            if let Err(e) = self.process_next_prompt().await {
                tracing::error!(error = %e, "[PromptService] Error processing prompt");
            }
        }

        tracing::info!("[PromptService] Scheduler stopped");
    }

    /// One scheduling decision. Returns the id of the processed prompt, or
    /// `None` when a prompt is already running or the queue is empty.
    ///
    /// The prompt's own failure is recorded on the prompt; the returned error
    /// is that same failure, for logging.
    pub async fn process_next_prompt(&self) -> Result<Option<String>> {
        let _run = self.run_lock.lock().await;

        let Some(prompt) = self.pick_next() else {
            return Ok(None);
        };
        let prompt_id = prompt.id.clone();
        self.process_prompt(prompt).await?;
        Ok(Some(prompt_id))
    }

    /// Selects the first queued prompt in collection order (enqueue order,
    /// requeues included) and moves it to `Running`, unless a prompt is
    /// already running.
    fn pick_next(&self) -> Option<Prompt> {
        let busy = self.prompts.read(|prompts| {
            prompts.iter().any(|p| p.status == PromptStatus::Running)
        });
        if busy {
            return None;
        }

        let has_queued = self.prompts.read(|prompts| {
            prompts.iter().any(|p| p.status == PromptStatus::Queued)
        });
        if !has_queued {
            return None;
        }

        self.prompts.update(|prompts| {
            let prompt = prompts.iter_mut().find(|p| p.status == PromptStatus::Queued)?;
            prompt.status = PromptStatus::Running;
            prompt.error.clear();
            prompt.run_count += 1;
            Some(prompt.clone())
        })
    }

    async fn process_prompt(&self, prompt: Prompt) -> Result<()> {
        tracing::info!(
            prompt_id = %prompt.id,
            run_count = prompt.run_count,
            "[PromptService] Picking up prompt from queue"
        );
        self.events.publish(Event::PromptProcessingStarted {
            prompt_id: prompt.id.clone(),
        });

        let result = self.execute(&prompt).await;
        if result.is_err() {
            self.streams.take_history(&prompt.thread_id);
        }

        let error = result.as_ref().err().map(ToString::to_string).unwrap_or_default();
        self.prompts.update(|prompts| {
            if let Some(stored) = prompts.iter_mut().find(|p| p.id == prompt.id) {
                if error.is_empty() {
                    stored.status = PromptStatus::Completed;
                } else {
                    stored.status = PromptStatus::Errored;
                    stored.error = error.clone();
                }
            }
        });

        match &result {
            Ok(()) => tracing::info!(prompt_id = %prompt.id, "[PromptService] Prompt completed"),
            Err(e) => tracing::warn!(prompt_id = %prompt.id, error = %e, "[PromptService] Prompt errored"),
        }
        self.events.publish(Event::PromptProcessingFinished {
            prompt_id: prompt.id.clone(),
            error,
        });
        result
    }

    async fn execute(&self, prompt: &Prompt) -> Result<()> {
        self.chat
            .add_chat_message(ChatMessage::user(
                prompt.id.as_str(),
                prompt.thread_id.as_str(),
                prompt.user_message.as_str(),
            ))
            .await?;

        let status = self.models.model_status(&prompt.model_id).await?;
        if !status.running {
            return Err(BerthError::ModelNotRunning {
                model_id: prompt.model_id.clone(),
            });
        }
        if status.address.is_empty() {
            return Err(BerthError::MissingAddress {
                model_id: prompt.model_id.clone(),
            });
        }
        if !status.answering {
            return Err(BerthError::ModelNotAnswering {
                model_id: prompt.model_id.clone(),
            });
        }
        let address = normalize_address(&status.address);

        let rendered = if prompt.rendered_prompt.is_empty() {
            prompt.user_message.clone()
        } else {
            prompt.rendered_prompt.clone()
        };

        self.streams.begin(&prompt.thread_id);
        let mut stream = self
            .llm
            .stream_completions(
                &address,
                CompletionRequest {
                    prompt: rendered,
                    stream: true,
                    max_tokens: self.settings.max_tokens,
                },
            )
            .await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let stop = chunk.is_stop();
            self.streams.broadcast(&prompt.thread_id, chunk);

            if stop {
                let history = self.streams.take_history(&prompt.thread_id);
                let content = llm_response_to_text(&history);
                self.chat
                    .add_chat_message(ChatMessage::assistant(
                        uuid::Uuid::new_v4().to_string(),
                        prompt.thread_id.as_str(),
                        content,
                    ))
                    .await?;
                return Ok(());
            }
        }

        Err(BerthError::stream("completion stream ended without a stop chunk"))
    }
}

/// Prefixes `http://` unless the address already carries a scheme.
fn normalize_address(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
