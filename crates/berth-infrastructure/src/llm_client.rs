//! Streaming completion client for OpenAI-compatible inference servers.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::VecDeque;

use berth_core::error::{BerthError, Result};
use berth_core::llm::{CompletionRequest, CompletionResponse, CompletionStream, LlmClient};

const DONE_MARKER: &str = "[DONE]";

/// Talks to `POST {address}/v1/completions` with `stream: true` and turns
/// the server-sent events into [`CompletionResponse`] chunks.
#[derive(Clone, Default)]
pub struct HttpLlmClient {
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn stream_completions(
        &self,
        address: &str,
        request: CompletionRequest,
    ) -> Result<CompletionStream> {
        let url = format!("{}/v1/completions", address.trim_end_matches('/'));
        tracing::debug!(%url, max_tokens = request.max_tokens, "[LlmClient] Requesting completion");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BerthError::stream(format!(
                "completion request failed with status {}: {}",
                status,
                body.trim()
            )));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(map_reqwest))
            .boxed();
        Ok(sse_completions(bytes))
    }
}

fn map_reqwest(err: reqwest::Error) -> BerthError {
    BerthError::stream(err.to_string())
}

/// What a single `data:` line carried.
#[derive(Debug, PartialEq, Eq)]
enum SseData {
    Payload(String),
    Done,
}

/// Splits a byte stream into SSE `data:` payloads. Lines may arrive split
/// across any number of network chunks.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = parse_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Whatever is left once the connection closes.
    fn finish(&mut self) -> Option<SseData> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == DONE_MARKER {
        Some(SseData::Done)
    } else if payload.is_empty() {
        None
    } else {
        Some(SseData::Payload(payload.to_string()))
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<CompletionResponse>>,
    finished: bool,
}

impl SseState {
    fn absorb(&mut self, events: impl IntoIterator<Item = SseData>) {
        for event in events {
            match event {
                SseData::Done => {
                    self.finished = true;
                    return;
                }
                SseData::Payload(json) => {
                    let parsed = serde_json::from_str::<CompletionResponse>(&json)
                        .map_err(|e| BerthError::stream(format!("invalid completion chunk: {e}")));
                    self.pending.push_back(parsed);
                }
            }
        }
    }
}

fn sse_completions(bytes: BoxStream<'static, Result<Vec<u8>>>) -> CompletionStream {
    let state = SseState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.absorb(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    let tail = state.decoder.finish();
                    state.absorb(tail);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
