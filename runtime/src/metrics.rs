//! Prometheus metrics for the ledger pipeline.
//!
//! Counters cover both halves of the pipeline:
//! - Command intake (accepted, rejected, failed to publish)
//! - Event publication per topic
//! - Event handling per topic and outcome
//! - Inbound messages dropped before reaching the handler
//!
//! # Example
//!
//! ```rust,no_run
//! use ledger_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and exposes it on an HTTP endpoint for Prometheus
/// scraping. Must be started from inside a Tokio runtime.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and start the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built (for example when the address
    /// cannot be bound) or the recorder cannot be installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), the call logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if let Err(e) = exporter.await {
                        tracing::error!(error = ?e, "Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "ledger_commands_total",
        "Commands submitted, labelled by command and outcome"
    );
    describe_counter!(
        "ledger_events_published_total",
        "Events accepted by the event bus, labelled by topic"
    );
    describe_histogram!(
        "ledger_publish_duration_seconds",
        "Time from publish call to transport acknowledgement"
    );
    describe_counter!(
        "ledger_events_handled_total",
        "Events passed to the account handler, labelled by topic and outcome"
    );
    describe_histogram!(
        "ledger_handle_duration_seconds",
        "Time taken to apply one event to the read model"
    );
    describe_counter!(
        "ledger_events_dropped_total",
        "Inbound messages dropped before handling, labelled by topic and reason"
    );
}

/// Command intake metrics recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record a submission and how it ended (`accepted`, `rejected`, `publish_failed`).
    pub fn record(command: &'static str, outcome: &'static str) {
        counter!("ledger_commands_total", "command" => command, "outcome" => outcome).increment(1);
    }
}

/// Event flow metrics recorder.
pub struct EventMetrics;

impl EventMetrics {
    /// Record an event accepted by the transport.
    pub fn record_published(topic: &'static str, duration: Duration) {
        counter!("ledger_events_published_total", "topic" => topic).increment(1);
        histogram!("ledger_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an event that reached the handler.
    pub fn record_handled(topic: &'static str, outcome: &'static str, duration: Duration) {
        counter!("ledger_events_handled_total", "topic" => topic, "outcome" => outcome).increment(1);
        histogram!("ledger_handle_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an inbound message dropped before handling.
    pub fn record_dropped(topic: String, reason: &'static str) {
        counter!("ledger_events_dropped_total", "topic" => topic, "reason" => reason).increment(1);
    }
}
