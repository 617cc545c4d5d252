//! In-process event bus.
//!
//! Every subscriber owns an unbounded delivery queue drained by its own task,
//! so a slow subscriber never holds up another one and events reach each
//! subscriber in publish order. Handlers run on a fresh tokio task per event;
//! an error or a panic is logged and delivery continues with the next event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::{
    domain::{Actor, Enrollment, Record},
    Result,
};

#[derive(Clone, Debug)]
pub enum DomainEvent {
    EnrollSubmitted(Enrollment),
    EnrollDecided {
        enrollment: Enrollment,
        moderator: Actor,
        passed: bool,
    },
    RecordPublished(Record),
    RecordUpdated(Record),
    RecordDeleted {
        record: Record,
        actor: Actor,
    },
    FeedbackReceived {
        record: Record,
        from: Actor,
        content: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventTopic {
    EnrollSubmitted,
    EnrollDecided,
    RecordPublished,
    RecordUpdated,
    RecordDeleted,
    FeedbackReceived,
}

impl DomainEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            DomainEvent::EnrollSubmitted(_) => EventTopic::EnrollSubmitted,
            DomainEvent::EnrollDecided { .. } => EventTopic::EnrollDecided,
            DomainEvent::RecordPublished(_) => EventTopic::RecordPublished,
            DomainEvent::RecordUpdated(_) => EventTopic::RecordUpdated,
            DomainEvent::RecordDeleted { .. } => EventTopic::RecordDeleted,
            DomainEvent::FeedbackReceived { .. } => EventTopic::FeedbackReceived,
        }
    }
}

#[async_trait]
pub trait EventSubscriber: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;
    /// Topics this subscriber receives.
    fn topics(&self) -> &[EventTopic];
    async fn handle(&self, event: DomainEvent) -> Result<()>;
}

struct Route {
    name: &'static str,
    topics: Vec<EventTopic>,
    sender: mpsc::UnboundedSender<DomainEvent>,
}

#[derive(Default)]
pub struct EventBus {
    routes: RwLock<Vec<Route>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and start its delivery task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DomainEvent>();
        let name = subscriber.name();
        self.routes.write().push(Route {
            name,
            topics: subscriber.topics().to_vec(),
            sender,
        });
        debug!(subscriber = name, topics = ?subscriber.topics(), "Subscriber registered");

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let topic = event.topic();
                let sub = Arc::clone(&subscriber);
                match tokio::spawn(async move { sub.handle(event).await }).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(subscriber = name, topic = ?topic, error = %e, "Event handler failed")
                    }
                    Err(e) => {
                        error!(subscriber = name, topic = ?topic, error = %e, "Event handler panicked")
                    }
                }
            }
            debug!(subscriber = name, "Delivery task stopped");
        });
    }

    /// Fan an event out to every subscriber of its topic. Never blocks and
    /// never fails; returns the number of queues the event was placed on.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let topic = event.topic();
        self.published.fetch_add(1, Ordering::Relaxed);

        let routes = self.routes.read();
        let mut delivered = 0;
        for route in routes.iter().filter(|r| r.topics.contains(&topic)) {
            if route.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(subscriber = route.name, topic = ?topic, "Delivery queue closed");
            }
        }
        if delivered == 0 {
            debug!(topic = ?topic, "Event has no subscribers");
        }
        delivered
    }

    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.routes.read().len()
    }
}
