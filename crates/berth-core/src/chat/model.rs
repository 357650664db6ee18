//! Chat domain model.

use serde::{Deserialize, Serialize};

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Creation timestamp (RFC 3339).
    #[serde(default)]
    pub created_at: String,
}

impl ChatThread {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// An append-only record of one turn in a thread.
///
/// `id` is unique within the message collection. Re-adding a message whose id
/// already exists is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Empty ids are replaced with a fresh UUID on insert.
    #[serde(default)]
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub is_user_message: bool,
    pub content: String,
    /// Creation timestamp (RFC 3339); stamped on insert when empty.
    #[serde(default)]
    pub created_at: String,
}

impl ChatMessage {
    /// A message typed by the user.
    pub fn user(id: impl Into<String>, thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            is_user_message: true,
            content: content.into(),
            created_at: String::new(),
        }
    }

    /// A message produced by the model.
    pub fn assistant(id: impl Into<String>, thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            is_user_message: false,
            content: content.into(),
            created_at: String::new(),
        }
    }
}
