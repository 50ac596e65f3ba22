//! Post-commit delivery of lifecycle events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::LendingEvent;
use tokio::sync::mpsc;

/// Receives events after the owning unit of work has committed.
///
/// Publishing cannot fail from the caller's point of view; implementations
/// contain their own errors.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish(&self, event: LendingEvent);
}

/// Forwards events to the notifier over a bounded channel.
///
/// A full channel applies backpressure: `publish` waits for the receiver
/// instead of dropping events whose state is already committed.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<LendingEvent>,
}

impl ChannelPublisher {
    pub fn new(sender: mpsc::Sender<LendingEvent>) -> Self {
        Self { sender }
    }

    /// Creates a publisher and the receiving end of its channel.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<LendingEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: LendingEvent) {
        let event_type = event.event_type();
        match self.sender.send(event).await {
            Ok(()) => {
                metrics::counter!("lending_events_published_total", "event_type" => event_type)
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!("lending_event_publish_failures_total", "event_type" => event_type)
                    .increment(1);
                tracing::warn!(event_type, error = %e, "dropping lifecycle event");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: LendingEvent) {}
}

/// Keeps published events in memory for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<LendingEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event published so far.
    pub fn events(&self) -> Vec<LendingEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: LendingEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use common::{BookId, UserId};

    fn available() -> LendingEvent {
        LendingEvent::BookAvailable {
            book_id: BookId::new(),
            user_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn channel_publisher_forwards_events() {
        let (publisher, mut rx) = ChannelPublisher::channel(4);
        let event = available();
        publisher.publish(event.clone()).await;
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn full_channel_waits_for_the_receiver() {
        let (publisher, mut rx) = ChannelPublisher::channel(1);
        let events: Vec<_> = (0..5).map(|_| available()).collect();

        let sending = {
            let events = events.clone();
            tokio::spawn(async move {
                for event in events {
                    publisher.publish(event).await;
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < events.len() {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("publisher stalled")
                .expect("channel closed early");
            received.push(event);
        }
        sending.await.unwrap();

        assert_eq!(received, events);
    }

    #[tokio::test]
    async fn closed_channel_is_contained() {
        let (publisher, rx) = ChannelPublisher::channel(1);
        drop(rx);
        publisher.publish(available()).await;
    }

    #[tokio::test]
    async fn recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        let first = available();
        let second = available();
        publisher.publish(first.clone()).await;
        publisher.publish(second.clone()).await;
        assert_eq!(publisher.events(), vec![first, second]);
    }
}
