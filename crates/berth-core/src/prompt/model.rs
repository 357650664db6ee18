//! Prompt domain model.

use serde::{Deserialize, Serialize};

/// Lifecycle of a queued prompt.
///
/// `Queued → Running → Completed | Errored`. At most one prompt in the whole
/// collection may be `Running` at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptStatus {
    Queued,
    Running,
    Completed,
    Errored,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }

    /// True once the prompt has reached Completed or Errored.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    /// Also used as the id of the user chat message, which keeps retries idempotent.
    #[serde(default)]
    pub id: String,
    pub thread_id: String,
    pub model_id: String,
    /// The message as the user typed it.
    pub user_message: String,
    /// The message rendered into the model's prompt template.
    pub rendered_prompt: String,
    pub status: PromptStatus,
    #[serde(default)]
    pub error: String,
    /// Incremented on every pickup.
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub created_at: String,
}

impl Prompt {
    /// Creates a queued prompt with a fresh id.
    pub fn new(
        thread_id: impl Into<String>,
        model_id: impl Into<String>,
        user_message: impl Into<String>,
        rendered_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            model_id: model_id.into(),
            user_message: user_message.into(),
            rendered_prompt: rendered_prompt.into(),
            status: PromptStatus::Queued,
            error: String::new(),
            run_count: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_prompt_is_queued() {
        let prompt = Prompt::new("t1", "m1", "hi", "[INST] hi [/INST]");
        assert_eq!(prompt.status, PromptStatus::Queued);
        assert_eq!(prompt.run_count, 0);
        assert!(!prompt.id.is_empty());
        assert!(prompt.error.is_empty());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_string(&PromptStatus::Errored).unwrap();
        assert_eq!(json, "\"errored\"");
        assert!(PromptStatus::Errored.is_terminal());
        assert!(!PromptStatus::Running.is_terminal());
    }
}
