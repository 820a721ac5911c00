// src/exam/events.rs

//! Exam event stream.
//!
//! Observers subscribe to a broadcast channel and unsubscribe by dropping
//! their `Subscription`. Events describe facts that already happened, so
//! handlers can safely see the same transition more than once.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{SessionStatus, Trigger};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExamEvent {
    SessionCreated {
        session_id: Uuid,
        config_key: &'static str,
        user_id: String,
    },
    PhaseChanged {
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        trigger: Trigger,
    },
    PersistenceDegraded {
        session_id: Uuid,
    },
    SessionExited {
        session_id: Uuid,
    },
    /// Dropped from memory after finishing or idling on the tutorial.
    SessionEvicted {
        session_id: Uuid,
    },
}

impl ExamEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            ExamEvent::SessionCreated { session_id, .. }
            | ExamEvent::PhaseChanged { session_id, .. }
            | ExamEvent::PersistenceDegraded { session_id }
            | ExamEvent::SessionExited { session_id }
            | ExamEvent::SessionEvicted { session_id } => *session_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExamEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of subscribers that will see the event.
    pub fn publish(&self, event: ExamEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Live subscription to the event stream. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ExamEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the bus is gone.
    /// A slow subscriber skips the events it missed.
    pub async fn recv(&mut self) -> Option<ExamEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "exam event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<ExamEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Spawns an observer that logs every event until the bus closes.
pub fn spawn_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            tracing::info!(session_id = %event.session_id(), ?event, "exam event");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        let id = Uuid::new_v4();
        assert_eq!(bus.publish(ExamEvent::SessionExited { session_id: id }), 1);
        assert_eq!(sub.recv().await, Some(ExamEvent::SessionExited { session_id: id }));
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let bus = EventBus::new(8);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.publish(ExamEvent::SessionExited {
                session_id: Uuid::new_v4()
            }),
            0
        );
    }

    #[test]
    fn lagging_subscriber_keeps_the_newest_events() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            bus.publish(ExamEvent::PersistenceDegraded { session_id: *id });
        }
        assert_eq!(sub.try_recv().map(|e| e.session_id()), Some(ids[2]));
        assert_eq!(sub.try_recv().map(|e| e.session_id()), Some(ids[3]));
        assert_eq!(sub.try_recv(), None);
    }
}
