//! In-memory event bus.
//!
//! Keeps every published event in a per-bus log and forwards it to every live
//! subscription of its topic. Subscriptions only see events published after they
//! were created (the `latest` offset policy).
//!
//! Delivery is strictly in publish order for each subscription, across topics as
//! well as within one.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use ledger_core::event::SerializedEvent;
use ledger_core::event_bus::{EventBus, EventBusError, EventStream};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Delivery = Result<SerializedEvent, EventBusError>;

struct Subscription {
    topics: HashSet<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct BusState {
    log: Vec<SerializedEvent>,
    subscriptions: Vec<Subscription>,
    publish_failure: Option<String>,
    subscribe_failure: Option<String>,
}

/// In-memory [`EventBus`] for tests and local runs.
///
/// # Example
///
/// ```
/// use ledger_testing::InMemoryEventBus;
/// use ledger_core::event::SerializedEvent;
/// use ledger_core::event_bus::EventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let event = SerializedEvent::new("CloseAccountEvent".into(), "acc-1".into(), b"{}".to_vec());
/// bus.publish("CloseAccountEvent", &event).await?;
/// assert_eq!(bus.published().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<SerializedEvent> {
        self.state.lock().unwrap().log.clone()
    }

    /// Events accepted on one topic, in publish order.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<SerializedEvent> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|event| event.event_type == topic)
            .cloned()
            .collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscriptions.retain(|s| !s.tx.is_closed());
        state.subscriptions.len()
    }

    /// Make every following `publish` fail with `reason`.
    pub fn fail_publishes(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().publish_failure = Some(reason.into());
    }

    /// Make every following `subscribe` fail with `reason`.
    pub fn fail_subscriptions(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().subscribe_failure = Some(reason.into());
    }

    /// Clear injected failures.
    pub fn recover(&self) {
        let mut state = self.state.lock().unwrap();
        state.publish_failure = None;
        state.subscribe_failure = None;
    }

    /// Push a transport error into every subscription of `topic`.
    pub fn inject_error(&self, topic: &str, error: EventBusError) {
        let state = self.state.lock().unwrap();
        for subscription in state.subscriptions.iter().filter(|s| s.topics.contains(topic)) {
            let _ = subscription.tx.send(Err(error.clone()));
        }
    }

    /// End every live subscription stream, as a dropped broker connection would.
    pub fn close_subscriptions(&self) {
        self.state.lock().unwrap().subscriptions.clear();
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            let mut state = self.state.lock().unwrap();

            if let Some(reason) = &state.publish_failure {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: reason.clone(),
                });
            }

            state.log.push(event.clone());
            state.subscriptions.retain(|subscription| {
                !subscription.topics.contains(&topic) || subscription.tx.send(Ok(event.clone())).is_ok()
            });

            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(reason) = &state.subscribe_failure {
                    return Err(EventBusError::SubscriptionFailed {
                        topics,
                        reason: reason.clone(),
                    });
                }
                state.subscriptions.push(Subscription {
                    topics: topics.into_iter().collect(),
                    tx,
                });
            }

            let stream = async_stream::stream! {
                while let Some(delivery) = rx.recv().await {
                    yield delivery;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
