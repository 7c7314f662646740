//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! These tests are marked as `#[ignore]` by default because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to spin up Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p ledger-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use futures::StreamExt;
use ledger_core::catalog::{DepositFundEvent, OpenAccountEvent};
use ledger_core::event::SerializedEvent;
use ledger_core::event_bus::EventBus;
use ledger_core::{AccountEvent, AccountId, AccountType, EventKind, Money};
use ledger_redpanda::RedpandaEventBus;
use ledger_runtime::{AccountEventHandler, BusPublisher, EventDispatcher, EventPublisher};
use ledger_testing::{InMemoryAccountRepository, SequentialIdGenerator, stepping_clock};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tokio::sync::broadcast;

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    wait_for_kafka_ready(&brokers).await;
    (kafka, brokers)
}

/// Publish a warmup message to every catalog topic so they exist before subscribing.
async fn wait_for_kafka_ready(brokers: &str) {
    let bus = RedpandaEventBus::builder()
        .brokers(brokers)
        .build()
        .expect("Failed to create warmup bus");

    for topic in EventKind::topics() {
        let warmup = SerializedEvent::new(topic.to_string(), "warmup".to_string(), b"{}".to_vec());
        let mut ready = false;
        for _ in 0..60 {
            if bus.publish(topic, &warmup).await.is_ok() {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        assert!(ready, "Kafka failed to accept messages on {topic}");
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
}

#[tokio::test]
#[ignore]
async fn events_round_trip_with_account_key() {
    let (_kafka, brokers) = start_kafka().await;

    let event_bus = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&brokers)
            .consumer_group("ledger-roundtrip")
            .auto_offset_reset("earliest")
            .build()
            .expect("Failed to create event bus"),
    );

    let mut stream = event_bus
        .subscribe(&["DepositFundEvent"])
        .await
        .expect("Failed to subscribe");

    let publisher = BusPublisher::new(event_bus.clone());
    let sent: Vec<AccountEvent> = (1..=5)
        .map(|n| {
            DepositFundEvent {
                id: "acc-kafka".into(),
                amount: Money::from_cents(n * 100),
            }
            .into()
        })
        .collect();
    for event in &sent {
        publisher.publish(event).await.expect("Failed to publish");
    }

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while received.len() < sent.len() {
            let Some(Ok(message)) = stream.next().await else {
                continue;
            };
            if message.key == "warmup" {
                continue;
            }
            assert_eq!(message.key, "acc-kafka");
            received.push(AccountEvent::from_serialized(&message).unwrap());
        }
    })
    .await
    .expect("Timed out waiting for events");

    // One key, one partition: order is preserved.
    assert_eq!(received, sent);
}

#[tokio::test]
#[ignore]
async fn dispatcher_applies_events_from_kafka() {
    let (_kafka, brokers) = start_kafka().await;

    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&brokers)
            .consumer_group("ledger-dispatcher-test")
            .auto_offset_reset("earliest")
            .build()
            .expect("Failed to create event bus"),
    );

    let repository = InMemoryAccountRepository::new();
    let handler = AccountEventHandler::new(
        Arc::new(repository.clone()),
        Arc::new(stepping_clock()),
        Arc::new(SequentialIdGenerator::new()),
    );
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let dispatcher = EventDispatcher::new("kafka-test", event_bus.clone(), Arc::new(handler), shutdown_rx)
        .start()
        .await
        .expect("Failed to start dispatcher");

    let publisher = BusPublisher::new(event_bus);
    let id = AccountId::new("acc-dispatch");
    publisher
        .publish(
            &OpenAccountEvent {
                id: id.clone(),
                account_holder: "Kafka".to_string(),
                account_type: AccountType::Checking,
                balance: Money::from_major(100),
            }
            .into(),
        )
        .await
        .unwrap();

    let mut opened = false;
    for _ in 0..300 {
        if repository.account(&id).is_some() {
            opened = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(opened, "open event was not applied");

    publisher
        .publish(
            &DepositFundEvent {
                id: id.clone(),
                amount: Money::from_major(25),
            }
            .into(),
        )
        .await
        .unwrap();

    let mut balance = None;
    for _ in 0..300 {
        balance = repository.account(&id).map(|a| a.balance);
        if balance == Some(Money::from_major(125)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(balance, Some(Money::from_major(125)));

    shutdown.send(()).unwrap();
    dispatcher.join().await.unwrap();
}
