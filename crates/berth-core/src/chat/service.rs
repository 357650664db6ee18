//! Chat service trait.

use async_trait::async_trait;

use super::model::{ChatMessage, ChatThread};
use crate::error::Result;

/// The chat collaborator.
///
/// `add_chat_message` is idempotent on the message id: inserting a message
/// whose id is already stored returns `Ok(())` and changes nothing. It fails
/// with `NotFound` when the referenced thread does not exist.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn add_chat_thread(&self, thread: ChatThread) -> Result<ChatThread>;

    async fn get_chat_thread(&self, thread_id: &str) -> Result<ChatThread>;

    async fn add_chat_message(&self, message: ChatMessage) -> Result<()>;

    /// Messages of a thread in insertion order.
    async fn get_chat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>>;
}
