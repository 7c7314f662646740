//! Event dispatcher with one worker per topic.
//!
//! The dispatcher subscribes to every topic in the catalog and routes each inbound
//! message to the account handler.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! Each topic gets its own subscription and its own task:
//!
//! ```text
//! start:
//!     subscribe to every catalog topic (any failure aborts startup)
//!     spawn one worker per topic
//!
//! worker loop {
//!     process_events:
//!         - decode by topic (unknown topic or bad payload: log, drop)
//!         - handle, and only then take the next message
//!         - check shutdown signal
//!     if stream ended:
//!         wait retry_delay, re-subscribe
//! }
//! ```
//!
//! Messages on different topics are handled concurrently. Messages on one topic are
//! handled strictly one at a time, in arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! let handle = EventDispatcher::builder()
//!     .name("ledger")
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(shutdown_rx)
//!     .build()?
//!     .start()
//!     .await?;
//!
//! // Later, after sending on the shutdown channel
//! handle.join().await?;
//! ```

use crate::handler::{EventHandler, HandleOutcome, HandlerError};
use crate::metrics::EventMetrics;
use futures::StreamExt;
use ledger_core::event::SerializedEvent;
use ledger_core::event_bus::{EventBus, EventBusError, EventStream};
use ledger_core::{AccountEvent, EventKind};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default delay before re-subscribing after a stream ends.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors from dispatcher setup and lifecycle.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A required builder field was not set.
    #[error("Dispatcher is missing required field: {0}")]
    Incomplete(&'static str),

    /// Subscribing to a catalog topic failed during startup.
    #[error("Failed to subscribe to {topic}: {source}")]
    Subscribe {
        /// Topic that could not be subscribed
        topic: &'static str,
        /// Transport error
        #[source]
        source: EventBusError,
    },

    /// A worker task panicked or was cancelled.
    #[error("Dispatcher worker for {topic} failed: {reason}")]
    Worker {
        /// Topic the worker served
        topic: &'static str,
        /// Join error description
        reason: String,
    },
}

/// What became of one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler applied the event.
    Handled(HandleOutcome),
    /// The handler refused or failed the event. It is not redelivered.
    Failed(HandlerError),
    /// The topic is not in the catalog.
    UnknownTopic,
    /// The payload did not decode as its topic's event kind.
    Malformed(String),
}

/// Lifecycle state of one topic worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Subscribed and waiting for the next message.
    Subscribed,
    /// Handling a message.
    Handling,
    /// Not subscribed: before start, while reconnecting, or after shutdown.
    Idle,
}

/// Route one message to `handler`.
///
/// Unknown topics and undecodable payloads are logged and dropped without reaching
/// the handler. Handler errors are logged; the message is not retried.
pub async fn dispatch(handler: &dyn EventHandler, event: &SerializedEvent) -> DispatchOutcome {
    let Some(kind) = EventKind::from_topic(&event.event_type) else {
        warn!(topic = %event.event_type, key = %event.key, "No handler for topic, dropping message");
        EventMetrics::record_dropped(event.event_type.clone(), "unknown_topic");
        return DispatchOutcome::UnknownTopic;
    };
    let topic = kind.topic();

    let decoded = match AccountEvent::decode(kind, &event.data) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(topic, key = %event.key, error = %e, "Dropping undecodable message");
            EventMetrics::record_dropped(topic.to_string(), "malformed");
            return DispatchOutcome::Malformed(e.to_string());
        }
    };

    let account_id = decoded.account_id().clone();
    let started = Instant::now();

    match handler.handle(decoded).await {
        Ok(outcome) => {
            debug!(topic, account_id = %account_id, "Event handled");
            EventMetrics::record_handled(topic, "applied", started.elapsed());
            DispatchOutcome::Handled(outcome)
        }
        Err(e @ HandlerError::NotFound(_)) => {
            warn!(topic, account_id = %account_id, error = %e, "Event dropped");
            EventMetrics::record_handled(topic, "not_found", started.elapsed());
            DispatchOutcome::Failed(e)
        }
        Err(e) => {
            error!(topic, account_id = %account_id, error = %e, "Failed to apply event");
            EventMetrics::record_handled(topic, "failed", started.elapsed());
            DispatchOutcome::Failed(e)
        }
    }
}

/// A message the transport could not deliver intact (for example one without a
/// payload). It never reaches the handler.
fn drop_stream_error(dispatcher: &str, kind: EventKind, error: &EventBusError) {
    error!(
        dispatcher,
        topic = kind.topic(),
        error = %error,
        "Error receiving event from stream"
    );
    EventMetrics::record_dropped(kind.topic().to_string(), "transport");
}

/// Subscribes to the catalog topics and feeds the handler.
pub struct EventDispatcher {
    name: String,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl EventDispatcher {
    /// Create a dispatcher with the default retry delay.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            event_bus,
            handler,
            shutdown,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Create a builder for configuring a dispatcher.
    #[must_use]
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::default()
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Route one message through this dispatcher's handler. See [`dispatch`].
    pub async fn dispatch(&self, event: &SerializedEvent) -> DispatchOutcome {
        dispatch(self.handler.as_ref(), event).await
    }

    /// Subscribe to every catalog topic and spawn the workers.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Subscribe`] if any topic cannot be subscribed. No
    /// worker is started in that case.
    pub async fn start(self) -> Result<DispatcherHandle, DispatchError> {
        let mut streams = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let topic = kind.topic();
            let stream = self.event_bus.subscribe(&[topic]).await.map_err(|source| {
                error!(dispatcher = %self.name, topic, error = %source, "Subscription failed");
                DispatchError::Subscribe { topic, source }
            })?;
            streams.push((kind, stream));
        }

        info!(dispatcher = %self.name, topics = ?EventKind::topics(), "Subscribed to event bus");

        let mut workers = Vec::with_capacity(streams.len());
        for (kind, stream) in streams {
            let (state, watcher) = watch::channel(DispatcherState::Subscribed);
            let worker = TopicWorker {
                dispatcher: self.name.clone(),
                kind,
                event_bus: Arc::clone(&self.event_bus),
                handler: Arc::clone(&self.handler),
                shutdown: self.shutdown.resubscribe(),
                retry_delay: self.retry_delay,
                state,
            };
            workers.push(Worker {
                kind,
                task: tokio::spawn(worker.run(stream)),
                state: watcher,
            });
        }

        Ok(DispatcherHandle { workers })
    }
}

struct Worker {
    kind: EventKind,
    task: JoinHandle<()>,
    state: watch::Receiver<DispatcherState>,
}

/// Handle to a started dispatcher.
pub struct DispatcherHandle {
    workers: Vec<Worker>,
}

impl DispatcherHandle {
    /// Current state of the worker for `kind`.
    #[must_use]
    pub fn state(&self, kind: EventKind) -> Option<DispatcherState> {
        self.workers
            .iter()
            .find(|w| w.kind == kind)
            .map(|w| *w.state.borrow())
    }

    /// Current state of every worker.
    #[must_use]
    pub fn states(&self) -> Vec<(EventKind, DispatcherState)> {
        self.workers
            .iter()
            .map(|w| (w.kind, *w.state.borrow()))
            .collect()
    }

    /// A receiver that observes every state change of the worker for `kind`.
    #[must_use]
    pub fn watch(&self, kind: EventKind) -> Option<watch::Receiver<DispatcherState>> {
        self.workers
            .iter()
            .find(|w| w.kind == kind)
            .map(|w| w.state.clone())
    }

    /// Stop every worker without waiting for the message in flight.
    pub fn abort(&self) {
        for worker in &self.workers {
            worker.task.abort();
        }
    }

    /// Wait for every worker to stop.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Worker`] for the first worker that panicked or was
    /// aborted.
    pub async fn join(self) -> Result<(), DispatchError> {
        for worker in self.workers {
            worker.task.await.map_err(|e| DispatchError::Worker {
                topic: worker.kind.topic(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

struct TopicWorker {
    dispatcher: String,
    kind: EventKind,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    state: watch::Sender<DispatcherState>,
}

impl TopicWorker {
    async fn run(mut self, stream: EventStream) {
        let topic = self.kind.topic();
        debug!(dispatcher = %self.dispatcher, topic, "Dispatcher worker started");

        let mut stream = Some(stream);
        loop {
            if let Some(mut active) = stream.take() {
                self.state.send_replace(DispatcherState::Subscribed);
                if self.process(&mut active).await.is_break() {
                    break;
                }
                warn!(
                    dispatcher = %self.dispatcher,
                    topic,
                    "Event stream ended, re-subscribing in {:?}",
                    self.retry_delay
                );
            }

            self.state.send_replace(DispatcherState::Idle);
            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }

            match self.event_bus.subscribe(&[topic]).await {
                Ok(resubscribed) => {
                    info!(dispatcher = %self.dispatcher, topic, "Re-subscribed to event bus");
                    stream = Some(resubscribed);
                }
                Err(e) => error!(
                    dispatcher = %self.dispatcher,
                    topic,
                    error = %e,
                    "Re-subscription failed, retrying in {:?}",
                    self.retry_delay
                ),
            }
        }

        self.state.send_replace(DispatcherState::Idle);
        info!(dispatcher = %self.dispatcher, topic, "Dispatcher worker stopped");
    }

    async fn process(&mut self, stream: &mut EventStream) -> ControlFlow<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(dispatcher = %self.dispatcher, topic = self.kind.topic(), "Shutdown signal received");
                    return ControlFlow::Break(());
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        self.state.send_replace(DispatcherState::Handling);
                        dispatch(self.handler.as_ref(), &event).await;
                        self.state.send_replace(DispatcherState::Subscribed);
                    }
                    Some(Err(e)) => drop_stream_error(&self.dispatcher, self.kind, &e),
                    None => return ControlFlow::Continue(()),
                }
            }
        }
    }
}

/// Builder for configuring an [`EventDispatcher`].
#[derive(Default)]
pub struct EventDispatcherBuilder {
    name: Option<String>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn EventHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl EventDispatcherBuilder {
    /// Set dispatcher name (for logging).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set custom retry delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the [`EventDispatcher`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] if the event bus, handler or shutdown
    /// receiver is missing. The name defaults to `ledger`.
    pub fn build(self) -> Result<EventDispatcher, DispatchError> {
        Ok(EventDispatcher {
            name: self.name.unwrap_or_else(|| "ledger".to_string()),
            event_bus: self.event_bus.ok_or(DispatchError::Incomplete("event_bus"))?,
            handler: self.handler.ok_or(DispatchError::Incomplete("handler"))?,
            shutdown: self.shutdown.ok_or(DispatchError::Incomplete("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}
