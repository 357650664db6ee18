//! Streaming completion contract of the inference engine.
//!
//! Only the minimal subset needed to drive the prompt queue is modelled: a
//! prompt goes in, a stream of partial completions comes out, and a chunk
//! whose finish reason is `stop` ends the answer.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const FINISH_REASON_STOP: &str = "stop";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub stream: bool,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One streamed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

impl CompletionResponse {
    /// A single-choice chunk, mostly useful for fakes and tests.
    pub fn chunk(text: impl Into<String>, finish_reason: Option<&str>) -> Self {
        Self {
            id: String::new(),
            choices: vec![CompletionChoice {
                text: text.into(),
                index: 0,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    /// True when the first choice carries the `stop` finish reason.
    pub fn is_stop(&self) -> bool {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            == Some(FINISH_REASON_STOP)
    }
}

pub type CompletionStream = BoxStream<'static, Result<CompletionResponse>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Starts a streaming completion against the server at `address`
    /// (an absolute `http://host:port` URL).
    async fn stream_completions(
        &self,
        address: &str,
        request: CompletionRequest,
    ) -> Result<CompletionStream>;
}
