//! Live fan-out of streamed completion chunks.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

use berth_core::llm::CompletionResponse;

const CHANNEL_CAPACITY: usize = 128;

/// Per-thread broadcast channels plus the transcript of the running job.
///
/// Delivery is best effort: subscribers only see chunks sent after they
/// subscribed, and a slow subscriber may miss chunks.
#[derive(Default)]
pub struct StreamManager {
    channels: Mutex<HashMap<String, broadcast::Sender<CompletionResponse>>>,
    histories: Mutex<HashMap<String, Vec<CompletionResponse>>>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, thread_id: &str) -> broadcast::Receiver<CompletionResponse> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(thread_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Starts a fresh transcript for `thread_id`.
    pub fn begin(&self, thread_id: &str) {
        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories.insert(thread_id.to_string(), Vec::new());
    }

    /// Sends `chunk` to live subscribers and appends it to the transcript.
    pub fn broadcast(&self, thread_id: &str, chunk: CompletionResponse) {
        {
            let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = channels.get(thread_id) {
                let _ = sender.send(chunk.clone());
            }
        }

        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories.entry(thread_id.to_string()).or_default().push(chunk);
    }

    /// Removes and returns the transcript of `thread_id`. The thread's
    /// channel is dropped once nobody listens to it any more.
    pub fn take_history(&self, thread_id: &str) -> Vec<CompletionResponse> {
        {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            if channels.get(thread_id).is_some_and(|sender| sender.receiver_count() == 0) {
                channels.remove(thread_id);
            }
        }

        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories.remove(thread_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_chunks() {
        let streams = StreamManager::new();
        let mut rx = streams.subscribe("t1");

        streams.begin("t1");
        streams.broadcast("t1", CompletionResponse::chunk("Hi", None));

        assert_eq!(rx.recv().await.unwrap().choices[0].text, "Hi");
    }

    #[test]
    fn test_history_is_per_thread_and_reset() {
        let streams = StreamManager::new();
        streams.broadcast("t1", CompletionResponse::chunk("stale", None));
        streams.begin("t1");
        streams.broadcast("t1", CompletionResponse::chunk("a", None));
        streams.broadcast("t2", CompletionResponse::chunk("b", None));

        let history = streams.take_history("t1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].choices[0].text, "a");
        assert!(streams.take_history("t1").is_empty());
        assert_eq!(streams.take_history("t2").len(), 1);
    }

    #[test]
    fn test_unused_channel_dropped_after_job() {
        let streams = StreamManager::new();
        let rx = streams.subscribe("t1");
        let _kept = streams.subscribe("t2");
        drop(rx);

        streams.begin("t1");
        streams.take_history("t1");
        streams.take_history("t2");

        let channels = streams.channels.lock().unwrap();
        assert!(!channels.contains_key("t1"));
        assert!(channels.contains_key("t2"));
    }
}
