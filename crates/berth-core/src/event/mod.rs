//! Events published on the firehose.

use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PromptAdded {
        prompt_id: String,
    },
    PromptProcessingStarted {
        prompt_id: String,
    },
    /// Published exactly once per pickup; `error` is empty on success.
    PromptProcessingFinished {
        prompt_id: String,
        error: String,
    },
    ChatMessageAdded {
        thread_id: String,
        message_id: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PromptAdded { .. } => "promptAdded",
            Self::PromptProcessingStarted { .. } => "promptProcessingStarted",
            Self::PromptProcessingFinished { .. } => "promptProcessingFinished",
            Self::ChatMessageAdded { .. } => "chatMessageAdded",
        }
    }
}

/// Fire-and-forget event bus. Publishing never fails from the caller's
/// point of view and gives no delivery guarantee.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: Event);
}
