//! Event trait and wire envelope.
//!
//! Events are immutable facts about things that have happened. Each event payload
//! belongs to exactly one [`EventKind`], and the kind decides the topic it travels on.
//!
//! # Design
//!
//! Payloads are serialized as JSON. The broker stores opaque bytes, so the payload has
//! to describe itself: field names and integer money amounts survive a
//! serialize/deserialize cycle exactly, and other consumers of the topics can read
//! them without sharing Rust types.
//!
//! # Example
//!
//! ```
//! use ledger_core::catalog::{DepositFundEvent, EventKind};
//! use ledger_core::event::Event;
//! use ledger_core::money::Money;
//!
//! let event = DepositFundEvent {
//!     id: "acc-1".into(),
//!     amount: Money::from_major(50),
//! };
//!
//! let bytes = event.to_bytes().unwrap();
//! assert_eq!(DepositFundEvent::from_bytes(&bytes).unwrap(), event);
//! assert_eq!(DepositFundEvent::KIND, EventKind::DepositFund);
//! ```

use crate::catalog::EventKind;
use crate::types::AccountId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize {kind} event: {reason}")]
    DeserializationError {
        /// Kind the payload was expected to hold
        kind: EventKind,
        /// Underlying decoder message
        reason: String,
    },

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// A domain event payload.
///
/// Every payload names its [`EventKind`] statically, so the mapping from Rust type to
/// topic is fixed at compile time.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` to be safely passed between threads
/// in the async runtime.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The catalog entry for this payload type.
    const KIND: EventKind;

    /// The account this event is about.
    fn account_id(&self) -> &AccountId;

    /// Returns the event type identifier for this event (its topic name).
    fn event_type(&self) -> &'static str {
        Self::KIND.topic()
    }

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not a valid
    /// payload for this kind.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }
}

/// A serialized event as it crosses the transport.
///
/// The transport routes on `event_type` (the topic) and partitions on `key`
/// (the account id). `data` is the JSON payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// The event type identifier, equal to the topic name.
    pub event_type: String,

    /// Partitioning key (the account id).
    pub key: String,

    /// The JSON-serialized payload.
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    ///
    /// # Examples
    ///
    /// ```
    /// use ledger_core::event::SerializedEvent;
    ///
    /// let event = SerializedEvent::new(
    ///     "DepositFundEvent".to_string(),
    ///     "acc-1".to_string(),
    ///     br#"{"id":"acc-1","amount":5000}"#.to_vec(),
    /// );
    /// assert_eq!(event.event_type, "DepositFundEvent");
    /// ```
    #[must_use]
    pub const fn new(event_type: String, key: String, data: Vec<u8>) -> Self {
        Self {
            event_type,
            key,
            data,
        }
    }

    /// Create a serialized event from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event>(event: &E) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            key: event.account_id().to_string(),
            data: event.to_bytes()?,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, key: {}, size: {} bytes }}",
            self.event_type,
            self.key,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::catalog::{CloseAccountEvent, WithdrawFundEvent};
    use crate::money::Money;

    #[test]
    fn event_type_is_topic_name() {
        let event = CloseAccountEvent { id: "acc-1".into() };
        assert_eq!(event.event_type(), "CloseAccountEvent");
    }

    #[test]
    fn serialized_event_from_event() {
        let event = WithdrawFundEvent {
            id: "acc-7".into(),
            amount: Money::from_cents(3000),
        };

        let serialized = SerializedEvent::from_event(&event).unwrap();

        assert_eq!(serialized.event_type, "WithdrawFundEvent");
        assert_eq!(serialized.key, "acc-7");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&serialized.data).unwrap(),
            serde_json::json!({ "id": "acc-7", "amount": 3000 })
        );
    }

    #[test]
    fn malformed_payload_names_expected_kind() {
        let err = WithdrawFundEvent::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(
            err,
            EventError::DeserializationError { kind: EventKind::WithdrawFund, .. }
        ));
    }

    #[test]
    fn serialized_event_display() {
        let serialized = SerializedEvent::new(
            "ShowBalanceEvent".to_string(),
            "acc-1".to_string(),
            vec![1, 2, 3, 4, 5],
        );

        let display = format!("{serialized}");
        assert!(display.contains("ShowBalanceEvent"));
        assert!(display.contains("5 bytes"));
    }
}
