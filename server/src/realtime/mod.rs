//! In-process publish/subscribe feeding the WebSocket endpoints.
//!
//! Channels are plain `tokio::sync::broadcast` senders keyed by name and
//! created on first subscription. Nothing is persisted: a receiver that falls
//! more than `CHANNEL_CAPACITY` events behind skips the ones it missed.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Notification, QueueStatus, TicketStatus};

pub mod ws;

pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    User(Uuid),
    Queue(Uuid),
    Organization(Uuid),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::User(id) => write!(f, "user:{id}"),
            Channel::Queue(id) => write!(f, "queue:{id}"),
            Channel::Organization(id) => write!(f, "organization:{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Notification {
        notification: Notification,
    },
    QueueUpdate {
        queue_id: Uuid,
        status: QueueStatus,
        waiting_count: usize,
        current_ticket_number: i32,
        estimated_wait_minutes: i64,
    },
    TicketCalled {
        queue_id: Uuid,
        ticket_id: Uuid,
        ticket_number: String,
    },
    TicketStatus {
        ticket_id: Uuid,
        status: TicketStatus,
    },
    Pong,
}

#[derive(Clone, Default)]
pub struct Hub {
    channels: Arc<DashMap<String, broadcast::Sender<Event>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Event> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many receivers got the event. Channels whose last
    /// receiver went away are dropped.
    pub fn publish(&self, channel: Channel, event: Event) -> usize {
        let key = channel.to_string();
        let delivered = match self.channels.get(&key) {
            Some(sender) => sender.send(event).ok(),
            None => return 0,
        };
        match delivered {
            Some(count) => count,
            None => {
                self.channels
                    .remove_if(&key, |_, sender| sender.receiver_count() == 0);
                0
            }
        }
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.channels
            .get(&channel.to_string())
            .map_or(0, |sender| sender.receiver_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(status: TicketStatus) -> Event {
        Event::TicketStatus {
            ticket_id: Uuid::nil(),
            status,
        }
    }

    #[test]
    fn test_channel_names() {
        let id = Uuid::nil();
        assert_eq!(
            Channel::Queue(id).to_string(),
            "queue:00000000-0000-0000-0000-000000000000"
        );
        assert!(Channel::User(id).to_string().starts_with("user:"));
    }

    #[test]
    fn test_event_is_tagged_by_type() {
        let json = serde_json::to_value(status_event(TicketStatus::Called)).unwrap();
        assert_eq!(json["type"], "ticket_status");
        assert_eq!(json["status"], "called");
        assert_eq!(serde_json::to_value(Event::Pong).unwrap()["type"], "pong");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = Hub::new();
        let queue = Channel::Queue(Uuid::new_v4());
        let mut first = hub.subscribe(queue);
        let mut second = hub.subscribe(queue);

        assert_eq!(hub.publish(queue, status_event(TicketStatus::Served)), 2);
        assert!(matches!(first.recv().await.unwrap(), Event::TicketStatus { .. }));
        assert!(matches!(second.recv().await.unwrap(), Event::TicketStatus { .. }));
    }

    #[test]
    fn test_publish_without_subscribers_is_a_no_op() {
        let hub = Hub::new();
        let channel = Channel::User(Uuid::new_v4());
        assert_eq!(hub.publish(channel, Event::Pong), 0);

        let receiver = hub.subscribe(channel);
        drop(receiver);
        assert_eq!(hub.publish(channel, Event::Pong), 0);
        assert_eq!(hub.subscriber_count(channel), 0);
    }

    #[tokio::test]
    async fn test_lagging_receiver_skips_missed_events() {
        let hub = Hub::new();
        let channel = Channel::Organization(Uuid::new_v4());
        let mut receiver = hub.subscribe(channel);
        for _ in 0..CHANNEL_CAPACITY + 5 {
            hub.publish(channel, Event::Pong);
        }
        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(5))
        ));
        assert!(receiver.recv().await.is_ok());
    }
}
