//! # Ledger Core
//!
//! Domain types and seams for an event-sourced ledger pipeline.
//!
//! The pipeline accepts commands, turns each valid one into exactly one immutable
//! event, and publishes it on the topic of its kind. A dispatcher on the other side
//! of the event bus applies events to a read model of accounts and their
//! transaction history.
//!
//! ## Modules
//!
//! - [`catalog`]: the closed set of event kinds, payloads and topic names
//! - [`command`]: commands and validation rules
//! - [`event`]: the `Event` trait and the wire envelope
//! - [`event_bus`]: publish/subscribe transport abstraction
//! - [`repository`]: the account read model and its storage contract
//! - [`environment`]: injected clock and id generation
//! - [`money`], [`types`]: value types
//!
//! ## Architecture Principles
//!
//! - Command intake and state mutation share nothing but the event bus
//! - Static topic mapping (no runtime type discovery)
//! - Dependency injection via constructor parameters

pub mod catalog;
pub mod command;
pub mod event;
pub mod event_bus;
pub mod money;
pub mod repository;
pub mod types;

// Re-export commonly used types
pub use catalog::{AccountEvent, EventKind};
pub use chrono::{DateTime, Utc};
pub use money::Money;
pub use types::{AccountId, AccountType, TransactionId, TransactionType};

/// Environment module - Dependency injection traits
///
/// Time and identifier generation are abstracted behind traits so handlers and
/// services can be driven deterministically in tests.
pub mod environment {
    use crate::types::{AccountId, TransactionId};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// struct SystemClock;
    /// impl Clock for SystemClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         Utc::now()
    ///     }
    /// }
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// System clock backed by [`Utc::now`].
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of new identifiers.
    pub trait IdGenerator: Send + Sync {
        /// A fresh account id (used only when opening an account).
        fn account_id(&self) -> AccountId;

        /// A fresh transaction record id.
        fn transaction_id(&self) -> TransactionId;
    }

    /// Random UUID v4 identifiers.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn account_id(&self) -> AccountId {
            AccountId::from_uuid(Uuid::new_v4())
        }

        fn transaction_id(&self) -> TransactionId {
            TransactionId::from_uuid(Uuid::new_v4())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{IdGenerator, UuidGenerator};

    #[test]
    fn uuid_generator_yields_distinct_ids() {
        let ids = UuidGenerator;
        assert_ne!(ids.account_id(), ids.account_id());
        assert_ne!(ids.transaction_id(), ids.transaction_id());
    }
}
