//! # Ledger Runtime
//!
//! Both halves of the ledger pipeline, joined only by an event bus.
//!
//! ## Core Components
//!
//! - **Command service**: validates commands and publishes one event per valid command
//! - **Publisher**: serializes events onto their kind's topic, keyed by account id
//! - **Dispatcher**: subscribes to every catalog topic and routes messages to the handler
//! - **Account handler**: applies events to the account read model
//!
//! ## Example
//!
//! ```ignore
//! use ledger_runtime::{AccountEventHandler, BusPublisher, CommandService, EventDispatcher};
//!
//! let service = CommandService::new(
//!     Arc::new(BusPublisher::new(event_bus.clone())),
//!     Arc::new(UuidGenerator),
//! );
//!
//! let handler = AccountEventHandler::new(repository, Arc::new(SystemClock), Arc::new(UuidGenerator));
//! let dispatcher = EventDispatcher::new("ledger", event_bus, Arc::new(handler), shutdown_rx)
//!     .start()
//!     .await?;
//!
//! service.open_account("Alice", AccountType::Checking, Money::from_major(100)).await?;
//! ```

/// Event dispatch from topics to the account handler
pub mod dispatcher;

/// Applying events to the read model
pub mod handler;

/// Prometheus metrics for observability
pub mod metrics;

/// Publishing events to the event bus
pub mod publisher;

/// Command intake
pub mod service;

pub use dispatcher::{
    DispatchError, DispatchOutcome, DispatcherHandle, DispatcherState, EventDispatcher,
    EventDispatcherBuilder, dispatch,
};
pub use handler::{AccountEventHandler, EventHandler, HandleOutcome, HandlerError};
pub use publisher::{BusPublisher, EventPublisher, PublishError};
pub use service::{CommandError, CommandService};
