//! In-process event bus.

use tokio::sync::broadcast;

use berth_core::event::{Event, EventPublisher};

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of domain events to any number of subscribers.
///
/// Publishing never fails: with no subscriber the event is dropped, and a
/// lagging subscriber loses the oldest events.
#[derive(Clone)]
pub struct BroadcastFirehose {
    sender: broadcast::Sender<Event>,
}

impl BroadcastFirehose {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastFirehose {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventPublisher for BroadcastFirehose {
    fn publish(&self, event: Event) {
        tracing::debug!(event = event.name(), "[Firehose] Publishing");
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let firehose = BroadcastFirehose::default();
        firehose.publish(Event::PromptAdded {
            prompt_id: "p1".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let firehose = BroadcastFirehose::default();
        let mut rx = firehose.subscribe();

        firehose.publish(Event::PromptProcessingStarted {
            prompt_id: "p1".into(),
        });
        firehose.publish(Event::PromptProcessingFinished {
            prompt_id: "p1".into(),
            error: String::new(),
        });

        assert_eq!(rx.recv().await.unwrap().name(), "promptProcessingStarted");
        assert_eq!(rx.recv().await.unwrap().name(), "promptProcessingFinished");
    }
}
