//! Chat threads and messages persisted through the state store.

use async_trait::async_trait;
use std::sync::Arc;

use berth_core::chat::{ChatMessage, ChatService, ChatThread};
use berth_core::error::{BerthError, Result};
use berth_core::event::{Event, EventPublisher};

use crate::paths::{BerthPaths, ServiceType};
use crate::storage::{Flushable, StateFile};

/// Chat collaborator backed by the `chatThreads` and `chatMessages` collections.
///
/// Message inserts are idempotent on `id`: adding a message whose id is
/// already stored leaves the collection untouched and succeeds.
pub struct StateChatService {
    threads: Arc<StateFile<Vec<ChatThread>>>,
    messages: Arc<StateFile<Vec<ChatMessage>>>,
    events: Arc<dyn EventPublisher>,
}

impl StateChatService {
    pub fn open(paths: &BerthPaths, events: Arc<dyn EventPublisher>) -> Result<Self> {
        let threads = StateFile::open(
            ServiceType::ChatThreads.key(),
            paths.state_file(ServiceType::ChatThreads),
        )?;
        let messages = StateFile::open(
            ServiceType::ChatMessages.key(),
            paths.state_file(ServiceType::ChatMessages),
        )?;
        Ok(Self::new(Arc::new(threads), Arc::new(messages), events))
    }

    pub fn new(
        threads: Arc<StateFile<Vec<ChatThread>>>,
        messages: Arc<StateFile<Vec<ChatMessage>>>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            threads,
            messages,
            events,
        }
    }

    /// Both collections, for the flush loops and shutdown hooks.
    pub fn flushables(&self) -> Vec<Arc<dyn Flushable>> {
        vec![
            Arc::clone(&self.threads) as Arc<dyn Flushable>,
            Arc::clone(&self.messages) as Arc<dyn Flushable>,
        ]
    }

    fn thread_exists(&self, thread_id: &str) -> bool {
        self.threads
            .read(|threads| threads.iter().any(|t| t.id == thread_id))
    }
}

#[async_trait]
impl ChatService for StateChatService {
    async fn add_chat_thread(&self, mut thread: ChatThread) -> Result<ChatThread> {
        if thread.id.is_empty() {
            thread.id = uuid::Uuid::new_v4().to_string();
        }
        if thread.created_at.is_empty() {
            thread.created_at = chrono::Utc::now().to_rfc3339();
        }

        let stored = self.threads.update(|threads| {
            match threads.iter().find(|t| t.id == thread.id) {
                Some(existing) => existing.clone(),
                None => {
                    threads.push(thread.clone());
                    thread
                }
            }
        });
        tracing::debug!(thread_id = %stored.id, "[ChatService] Thread stored");
        Ok(stored)
    }

    async fn get_chat_thread(&self, thread_id: &str) -> Result<ChatThread> {
        self.threads
            .read(|threads| threads.iter().find(|t| t.id == thread_id).cloned())
            .ok_or_else(|| BerthError::not_found("Thread", thread_id))
    }

    async fn add_chat_message(&self, mut message: ChatMessage) -> Result<()> {
        if message.thread_id.is_empty() {
            return Err(BerthError::validation("empty thread id"));
        }
        if message.id.is_empty() {
            message.id = uuid::Uuid::new_v4().to_string();
        }
        if message.created_at.is_empty() {
            message.created_at = chrono::Utc::now().to_rfc3339();
        }

        if !self.thread_exists(&message.thread_id) {
            return Err(BerthError::not_found("Thread", message.thread_id.as_str()));
        }

        let thread_id = message.thread_id.clone();
        let message_id = message.id.clone();
        let inserted = self.messages.update_if(|messages| {
            if messages.iter().any(|m| m.id == message.id) {
                return false;
            }
            messages.push(message);
            true
        });

        if inserted {
            tracing::debug!(%thread_id, %message_id, "[ChatService] Message added");
            self.events.publish(Event::ChatMessageAdded {
                thread_id,
                message_id,
            });
        } else {
            tracing::debug!(%thread_id, %message_id, "[ChatService] Message already present");
        }
        Ok(())
    }

    async fn get_chat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self.messages.read(|messages| {
            messages
                .iter()
                .filter(|m| m.thread_id == thread_id)
                .cloned()
                .collect()
        }))
    }
}
