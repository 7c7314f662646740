//! Event bus abstraction between command intake and event handling.
//!
//! The producer side publishes every accepted event to the topic of its kind; the
//! consumer side subscribes to the catalog topics and applies what arrives. The bus
//! is the only thing the two sides share.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Command   │
//! └──────┬──────┘
//!        │ validate + derive
//!        ▼
//! ┌─────────────────┐
//! │    Publisher    │
//! └────────┬────────┘
//!          │ publish(topic = kind, key = account id)
//!          ▼
//! ┌─────────────────┐
//! │    Event Bus    │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │ one stream per topic
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │──► Account handler ──► Repository
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Accepted, not handled**: `publish` resolves once the transport has taken the
//!   event, never after a consumer has processed it
//! - **At-least-once delivery**: Events may be delivered multiple times
//! - **Ordered within partition**: Events sharing a topic and key keep their order
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `ledger-testing` - for tests and the local demo
//! - `RedpandaEventBus` in `ledger-redpanda` - Kafka-compatible, for production
//!
//! # Example
//!
//! ```rust,ignore
//! use ledger_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! async fn example(event_bus: impl EventBus) -> Result<(), Box<dyn std::error::Error>> {
//!     let event = deposit.encode()?;
//!     event_bus.publish(&event.event_type, &event).await?;
//!
//!     let mut stream = event_bus.subscribe(&["DepositFundEvent"]).await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(event) => println!("Received: {}", event),
//!             Err(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be turned into an event envelope
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of events from a subscription.
///
/// Each item is either an event envelope or a transport-level error. Errors do not
/// end the stream; the stream ends when the transport closes it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so a single bus can be shared by the
/// command service and every dispatcher worker.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventBus>`).
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// Resolves once the transport has accepted the event. Two publishes awaited one
    /// after the other for the same topic and key are delivered in that order.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the transport rejects the event or
    /// does not acknowledge it in time.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of events.
    ///
    /// Within one topic the stream yields events in the order the transport
    /// delivered them.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
