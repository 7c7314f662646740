//! Redpanda event bus for the ledger pipeline.
//!
//! This crate provides a Redpanda-based event bus that implements the [`EventBus`]
//! trait from `ledger-core`. It uses rdkafka for Kafka-compatible event streaming,
//! so any Kafka-protocol broker works.
//!
//! # Wire Format
//!
//! | Kafka field | Value |
//! |---|---|
//! | topic | event kind topic (`DepositFundEvent`, ...) |
//! | key | account id |
//! | payload | JSON event payload |
//!
//! The payload is the bare JSON body, with no extra envelope, so other Kafka clients
//! can read the topics directly.
//!
//! # Delivery Semantics
//!
//! **Producer**: `publish` resolves on the broker's delivery report. With the default
//! `acks=all` the producer also runs with idempotence enabled, which keeps
//! broker-side retries from duplicating or reordering messages of one partition.
//! Keying by account id puts every event of one kind for one account on one
//! partition.
//!
//! **Consumer**: at-least-once with manual offset commits:
//! - A message's offset is committed when the subscriber polls for the next message,
//!   so a subscriber that finishes each message before asking for another (as the
//!   dispatcher does) only ever commits handled messages
//! - Messages read ahead into the subscription buffer are not committed; after a
//!   crash they are redelivered
//! - Ordering is guaranteed within a partition
//!
//! # Example
//!
//! ```no_run
//! use ledger_redpanda::RedpandaEventBus;
//! use ledger_core::event_bus::EventBus;
//! use ledger_core::event::SerializedEvent;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let event = SerializedEvent::new(
//!     "CloseAccountEvent".to_string(),
//!     "acc-1".to_string(),
//!     br#"{"id":"acc-1"}"#.to_vec(),
//! );
//! event_bus.publish("CloseAccountEvent", &event).await?;
//!
//! let mut stream = event_bus.subscribe(&["CloseAccountEvent"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => println!("Received: {event}"),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use ledger_core::event::SerializedEvent;
use ledger_core::event_bus::{EventBus, EventBusError, EventStream};
use futures::Stream;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_ACKS: &str = "all";
const DEFAULT_OFFSET_RESET: &str = "latest";
const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks (default `all`), compression, send timeout
/// - **Consumer group**: Explicit ID, or derived from the subscribed topics
/// - **Buffer size**: Per-subscription buffer capacity (default: 1000)
/// - **Offset reset**: Where new groups start reading (default: `latest`)
///
/// # Example
///
/// ```no_run
/// use ledger_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .consumer_group("ledger-consumer")
///     .auto_offset_reset("earliest")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            // Sort topics for deterministic consumer group naming
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("ledger-{}", sorted.join("-"))
        })
    }
}

/// Turn a received Kafka message into an event envelope.
///
/// The topic becomes the event type and the key (lossily decoded as UTF-8) the
/// envelope key.
///
/// # Errors
///
/// Returns [`EventBusError::DeserializationFailed`] if the message has no payload.
pub fn envelope_from_message(
    topic: &str,
    key: Option<&[u8]>,
    payload: Option<&[u8]>,
) -> Result<SerializedEvent, EventBusError> {
    let payload = payload.ok_or_else(|| {
        EventBusError::DeserializationFailed(format!("Message on {topic} has no payload"))
    })?;
    let key = key
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .unwrap_or_default();

    Ok(SerializedEvent::new(topic.to_string(), key, payload.to_vec()))
}

/// Where a delivered message sits in its partition.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Position {
    topic: String,
    partition: i32,
    offset: i64,
}

impl Position {
    /// The commit that marks this message as consumed: the group resumes after it.
    fn commit_list(&self) -> KafkaResult<TopicPartitionList> {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))?;
        Ok(list)
    }
}

/// Yield buffered items, acknowledging each one only when the next is requested.
///
/// The last item handed out stays unacknowledged until the stream is polled again,
/// so dropping the stream leaves it to be redelivered.
fn acknowledge_on_next<T, P, F>(
    mut rx: mpsc::Receiver<(T, Option<P>)>,
    acknowledge: F,
) -> impl Stream<Item = T> + Send
where
    T: Send + 'static,
    P: Send + 'static,
    F: Fn(P) + Send + 'static,
{
    async_stream::stream! {
        while let Some((item, position)) = rx.recv().await {
            yield item;
            if let Some(position) = position {
                acknowledge(position);
            }
        }
    }
}

fn commit(consumer: &StreamConsumer, position: &Position) {
    let committed = position
        .commit_list()
        .and_then(|list| consumer.commit(&list, CommitMode::Async));
    if let Err(e) = committed {
        tracing::warn!(
            topic = %position.topic,
            partition = position.partition,
            offset = position.offset,
            error = %e,
            "Failed to commit offset (message may be redelivered)"
        );
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `0`, `1` or `all` (`-1` is read as `all`).
    ///
    /// Default: `all`. Idempotence is only enabled with `all`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        let acks = acks.into();
        self.producer_acks = Some(if acks.trim() == "-1" {
            DEFAULT_ACKS.to_string()
        } else {
            acks
        });
        self
    }

    /// Set the compression codec: `none`, `gzip`, `snappy`, `lz4`, `zstd`.
    ///
    /// Default: `none`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// If not set, the group is derived from the subscribed topics. Instances sharing
    /// a group split the partitions of each topic between them.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the per-subscription buffer size. Zero is treated as one.
    ///
    /// Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set the auto offset reset policy for new consumer groups:
    /// `earliest`, `latest` or `error`.
    ///
    /// Default: `latest`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Producer configuration this builder would apply.
    fn producer_config(&self, brokers: &str) -> ClientConfig {
        let acks = self.producer_acks.as_deref().unwrap_or(DEFAULT_ACKS);
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("enable.idempotence", (acks == "all").to_string())
            .set("compression.type", self.compression.as_deref().unwrap_or("none"));
        config
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or the
    /// producer cannot be created from the configuration.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.clone().ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;

        let producer: FutureProducer = self.producer_config(&brokers).create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_OFFSET_RESET.to_string());

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or(DEFAULT_ACKS),
            compression = self.compression.as_deref().unwrap_or("none"),
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::to(&topic)
                .payload(&event.data)
                .key(event.key.as_bytes());

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        key = %event.key,
                        partition,
                        offset,
                        "Event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %event.key,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let consumer_group_id = self.consumer_group_for(&topics);
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            // Manual commit for at-least-once
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let consumer = Arc::new(consumer);
            let (tx, rx) = mpsc::channel(buffer_size);

            // The task reads ahead into the buffer; commits happen on the stream side.
            let reader = Arc::clone(&consumer);
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = reader.stream();

                while let Some(received) = stream.next().await {
                    let delivery = match received {
                        Ok(message) => {
                            let result =
                                envelope_from_message(message.topic(), message.key(), message.payload());

                            if let Ok(event) = &result {
                                tracing::trace!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    key = %event.key,
                                    "Received event"
                                );
                            }

                            let position = Position {
                                topic: message.topic().to_string(),
                                partition: message.partition(),
                                offset: message.offset(),
                            };
                            (result, Some(position))
                        }
                        Err(e) => (
                            Err(EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ))),
                            None,
                        ),
                    };

                    if tx.send(delivery).await.is_err() {
                        tracing::debug!("Channel receiver dropped, exiting consumer task");
                        break;
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = acknowledge_on_next(rx, move |position: Position| {
                commit(&consumer, &position);
            });

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
