//! Event publication.
//!
//! The publisher is the only component that talks to the event bus on the command
//! side. It serializes an [`AccountEvent`] and sends it to its kind's topic with the
//! account id as the message key.

use crate::metrics::EventMetrics;
use async_trait::async_trait;
use ledger_core::AccountEvent;
use ledger_core::event::EventError;
use ledger_core::event_bus::{EventBus, EventBusError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned when an event could not be published.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be serialized.
    #[error("Failed to encode event: {0}")]
    Encode(#[from] EventError),

    /// The transport refused or did not acknowledge the event.
    #[error(transparent)]
    Transport(#[from] EventBusError),
}

/// Sends events to the event bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event and wait for the transport to accept it.
    ///
    /// Awaiting each publish before issuing the next keeps a single caller's events
    /// for one account in issue order.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the event cannot be encoded or the transport
    /// rejects it.
    async fn publish(&self, event: &AccountEvent) -> Result<(), PublishError>;
}

/// [`EventPublisher`] over any [`EventBus`].
#[derive(Clone)]
pub struct BusPublisher {
    event_bus: Arc<dyn EventBus>,
}

impl BusPublisher {
    /// Publish through `event_bus`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>) -> Self {
        Self { event_bus }
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn publish(&self, event: &AccountEvent) -> Result<(), PublishError> {
        let topic = event.topic();
        let serialized = event.encode()?;
        let started = Instant::now();

        match self.event_bus.publish(topic, &serialized).await {
            Ok(()) => {
                EventMetrics::record_published(topic, started.elapsed());
                debug!(
                    topic,
                    account_id = %serialized.key,
                    size = serialized.data.len(),
                    "Event published"
                );
                Ok(())
            }
            Err(e) => {
                warn!(topic, account_id = %serialized.key, error = %e, "Event publish failed");
                Err(e.into())
            }
        }
    }
}
