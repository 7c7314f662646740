//! # Ledger Testing
//!
//! Testing utilities for the ledger pipeline.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: a topic log with live subscriptions and failure injection
//! - [`InMemoryAccountRepository`]: `HashMap`-backed read model with failure injection
//! - Deterministic clocks and id generators
//! - A test tracing subscriber
//!
//! ## Example
//!
//! ```ignore
//! use ledger_testing::{InMemoryAccountRepository, InMemoryEventBus, SequentialIdGenerator, test_clock};
//!
//! #[tokio::test]
//! async fn test_open_account() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let repository = Arc::new(InMemoryAccountRepository::new());
//!     // wire a CommandService and EventDispatcher around them ...
//! }
//! ```

pub mod event_bus;
pub mod repository;

pub use event_bus::InMemoryEventBus;
pub use repository::{InMemoryAccountRepository, RepositoryOperation};

/// Mock implementations of Environment traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use ledger_core::environment::{Clock, IdGenerator};
    use ledger_core::types::{AccountId, TransactionId};
    use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
    use uuid::Uuid;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ledger_testing::mocks::FixedClock;
    /// use ledger_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every read.
    ///
    /// Gives every transaction record a distinct, increasing timestamp.
    #[derive(Debug)]
    pub struct SteppingClock {
        start: DateTime<Utc>,
        step: Duration,
        ticks: AtomicI32,
    }

    impl SteppingClock {
        /// Starts at `start` and moves forward by `step` per call to `now`.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                start,
                step,
                ticks: AtomicI32::new(0),
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + self.step * tick
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Create a stepping clock starting 2025-01-01 00:00:00 UTC, one second per read.
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(epoch(), Duration::seconds(1))
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Predictable identifiers: `acc-1`, `acc-2`, ... and UUIDs built from a counter.
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        accounts: AtomicU64,
        transactions: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start both sequences at 1.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                accounts: AtomicU64::new(0),
                transactions: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn account_id(&self) -> AccountId {
            let n = self.accounts.fetch_add(1, Ordering::SeqCst) + 1;
            AccountId::new(format!("acc-{n}"))
        }

        fn transaction_id(&self) -> TransactionId {
            let n = self.transactions.fetch_add(1, Ordering::SeqCst) + 1;
            TransactionId::from_uuid(Uuid::from_u128(u128::from(n)))
        }
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, SequentialIdGenerator, SteppingClock, stepping_clock, test_clock};
