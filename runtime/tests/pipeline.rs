//! End-to-end pipeline tests: command service → in-memory bus → dispatcher → repository.

#![allow(clippy::unwrap_used)]

use ledger_core::event::SerializedEvent;
use ledger_core::event_bus::EventBus;
use ledger_core::repository::AccountRepository;
use ledger_core::{AccountId, AccountType, Money, TransactionType};
use ledger_runtime::{
    AccountEventHandler, BusPublisher, CommandService, DispatchOutcome, DispatcherHandle,
    EventDispatcher, HandleOutcome,
};
use ledger_testing::{
    InMemoryAccountRepository, InMemoryEventBus, SequentialIdGenerator, init_test_tracing,
    stepping_clock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Pipeline {
    bus: InMemoryEventBus,
    repository: InMemoryAccountRepository,
    service: CommandService,
    handler: Arc<AccountEventHandler>,
    dispatcher: DispatcherHandle,
    shutdown: broadcast::Sender<()>,
}

impl Pipeline {
    async fn start() -> Self {
        init_test_tracing();

        let bus = InMemoryEventBus::new();
        let repository = InMemoryAccountRepository::new();
        let event_bus: Arc<dyn EventBus> = Arc::new(bus.clone());

        let service = CommandService::new(
            Arc::new(BusPublisher::new(Arc::clone(&event_bus))),
            Arc::new(SequentialIdGenerator::new()),
        );
        let handler = Arc::new(AccountEventHandler::new(
            Arc::new(repository.clone()),
            Arc::new(stepping_clock()),
            Arc::new(SequentialIdGenerator::new()),
        ));

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let dispatcher = EventDispatcher::builder()
            .name("pipeline-test")
            .event_bus(event_bus)
            .handler(handler.clone())
            .shutdown(shutdown_rx)
            .retry_delay(Duration::from_millis(10))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();

        Self {
            bus,
            repository,
            service,
            handler,
            dispatcher,
            shutdown,
        }
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.dispatcher.join().await.unwrap();
    }

    /// Wait until `check` holds for the repository.
    async fn eventually(&self, check: impl Fn(&InMemoryAccountRepository) -> bool) {
        for _ in 0..400 {
            if check(&self.repository) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(check(&self.repository), "condition not reached in time");
    }

    async fn balance_reaches(&self, id: &AccountId, balance: Money) {
        self.eventually(|r| r.account(id).is_some_and(|a| a.balance == balance))
            .await;
    }
}

#[tokio::test]
async fn open_deposit_withdraw_scenario() {
    let pipeline = Pipeline::start().await;

    let id = pipeline
        .service
        .open_account("Alice", AccountType::Checking, "100.00".parse().unwrap())
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(100)).await;

    pipeline
        .service
        .deposit_fund(id.as_str(), "50.00".parse().unwrap())
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(150)).await;

    pipeline
        .service
        .withdraw_fund(id.as_str(), "30.00".parse().unwrap())
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(120)).await;

    let history = pipeline.repository.find_transactions(&id).await.unwrap();
    let summary: Vec<_> = history
        .iter()
        .map(|t| (t.transaction_type, t.amount.to_string()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (TransactionType::Withdraw, "30.00".to_string()),
            (TransactionType::Deposit, "50.00".to_string()),
            (TransactionType::Deposit, "100.00".to_string()),
        ]
    );

    pipeline.service.show_balance(id.as_str()).await.unwrap();
    assert_eq!(pipeline.bus.published_on("ShowBalanceEvent").len(), 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn withdraw_from_unknown_account_creates_nothing() {
    let pipeline = Pipeline::start().await;

    pipeline
        .service
        .withdraw_fund("no-such-account", Money::from_major(10))
        .await
        .unwrap();

    // A later event on the same topic proves the first one was consumed.
    let id = pipeline
        .service
        .open_account("Bob", AccountType::Savings, Money::from_major(5))
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(5)).await;
    pipeline
        .service
        .withdraw_fund(id.as_str(), Money::from_major(1))
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(4)).await;

    assert!(pipeline.repository.account(&"no-such-account".into()).is_none());
    assert!(pipeline.repository.transactions_for(&"no-such-account".into()).is_empty());
    assert_eq!(pipeline.repository.account_count(), 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn close_removes_account_but_keeps_history() {
    let pipeline = Pipeline::start().await;

    let id = pipeline
        .service
        .open_account("Carol", AccountType::FixedDeposit, Money::from_major(70))
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(70)).await;

    pipeline.service.close_account(id.as_str()).await.unwrap();
    pipeline.eventually(|r| r.account(&id).is_none()).await;

    assert!(pipeline.repository.find_account(&id).await.unwrap_err().is_not_found());
    assert_eq!(pipeline.repository.find_transactions(&id).await.unwrap().len(), 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn malformed_message_is_dropped_and_topic_keeps_flowing() {
    let pipeline = Pipeline::start().await;

    let id = pipeline
        .service
        .open_account("Dave", AccountType::Checking, Money::from_major(10))
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(10)).await;

    let garbage = SerializedEvent::new(
        "DepositFundEvent".to_string(),
        id.to_string(),
        b"{\"id\": 42".to_vec(),
    );
    pipeline.bus.publish("DepositFundEvent", &garbage).await.unwrap();
    pipeline
        .service
        .deposit_fund(id.as_str(), Money::from_major(1))
        .await
        .unwrap();

    pipeline.balance_reaches(&id, Money::from_major(11)).await;
    assert_eq!(pipeline.repository.transactions_for(&id).len(), 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn one_topic_is_applied_in_publish_order() {
    let pipeline = Pipeline::start().await;

    let id = pipeline
        .service
        .open_account("Erin", AccountType::Checking, Money::from_major(1))
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(1)).await;

    for cents in 1..=20 {
        pipeline
            .service
            .deposit_fund(id.as_str(), Money::from_cents(cents))
            .await
            .unwrap();
    }

    // 1.00 + (1 + 2 + ... + 20) cents
    pipeline.balance_reaches(&id, Money::from_cents(100 + 210)).await;
    let amounts: Vec<_> = pipeline
        .repository
        .transactions_for(&id)
        .iter()
        .skip(1)
        .map(|t| t.amount.cents())
        .collect();
    assert_eq!(amounts, (1..=20).collect::<Vec<_>>());

    pipeline.stop().await;
}

#[tokio::test]
async fn dispatch_reports_query_results() {
    let pipeline = Pipeline::start().await;

    let id = pipeline
        .service
        .open_account("Frank", AccountType::Savings, Money::from_major(3))
        .await
        .unwrap();
    pipeline.balance_reaches(&id, Money::from_major(3)).await;

    pipeline.service.show_balance(id.as_str()).await.unwrap();
    let request = pipeline.bus.published_on("ShowBalanceEvent").pop().unwrap();

    let outcome = ledger_runtime::dispatch(pipeline.handler.as_ref(), &request).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Handled(HandleOutcome::Balance {
            account_id: id,
            balance: Money::from_major(3),
        })
    );

    pipeline.stop().await;
}
