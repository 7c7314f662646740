//! Ledger pipeline demo.
//!
//! Runs the full pipeline in memory and walks one account through its lifecycle:
//! open, deposit, withdraw, report, close.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p ledger-service --bin demo
//! ```

use anyhow::{Context, bail};
use ledger_core::environment::{SystemClock, UuidGenerator};
use ledger_core::event_bus::EventBus;
use ledger_core::repository::AccountRepository;
use ledger_core::{AccountId, AccountType, Money, TransactionType};
use ledger_runtime::{AccountEventHandler, BusPublisher, CommandService, EventDispatcher};
use ledger_service::{init_tracing, signal_shutdown};
use ledger_testing::{InMemoryAccountRepository, InMemoryEventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Topics are per event kind, so a step is only applied once the previous one has
/// landed in the read model.
async fn settle(what: &str, done: impl Fn() -> bool) -> anyhow::Result<()> {
    for _ in 0..500 {
        if done() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("timed out waiting for {what}")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,ledger_runtime=debug");

    println!("\n============================================");
    println!("   Ledger Pipeline - In-Memory Demo");
    println!("============================================\n");

    let repository = InMemoryAccountRepository::new();
    let event_bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());

    let service = CommandService::new(
        Arc::new(BusPublisher::new(Arc::clone(&event_bus))),
        Arc::new(UuidGenerator),
    );
    let handler = AccountEventHandler::new(
        Arc::new(repository.clone()),
        Arc::new(SystemClock),
        Arc::new(UuidGenerator),
    );

    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let dispatcher = EventDispatcher::new("demo", event_bus, Arc::new(handler), shutdown_rx)
        .with_retry_delay(Duration::from_millis(50))
        .start()
        .await
        .context("Failed to start dispatcher")?;

    println!("Step 1: open a checking account for Alice with 100.00");
    let id = service
        .open_account("Alice", AccountType::Checking, Money::from_major(100))
        .await?;
    settle("account to open", || repository.account(&id).is_some()).await?;
    println!("  account {id} opened\n");

    step(&service, &repository, &id, 2, TransactionType::Deposit, Money::from_major(50)).await?;
    step(&service, &repository, &id, 3, TransactionType::Withdraw, Money::from_major(30)).await?;

    println!("Step 4: reports");
    service.show_balance(id.as_str()).await?;
    service.show_transactions(id.as_str()).await?;

    let account = repository.find_account(&id).await?;
    println!("  balance: {}", account.balance);
    for transaction in repository.find_transactions(&id).await? {
        println!(
            "  {} {:>8} {}",
            transaction.created_at.format("%H:%M:%S%.3f"),
            transaction.amount,
            transaction.transaction_type
        );
    }
    println!();

    println!("Step 5: withdraw from an account that does not exist");
    service
        .withdraw_fund("no-such-account", Money::from_major(10))
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!(
        "  accounts in read model: {} (nothing created)\n",
        repository.account_count()
    );

    println!("Step 6: close the account");
    service.close_account(id.as_str()).await?;
    settle("account to close", || repository.account(&id).is_none()).await?;
    println!(
        "  account closed, {} transactions remain queryable\n",
        repository.find_transactions(&id).await?.len()
    );

    signal_shutdown(&shutdown);
    dispatcher.join().await?;

    println!("Demo complete.");
    Ok(())
}

async fn step(
    service: &CommandService,
    repository: &InMemoryAccountRepository,
    id: &AccountId,
    number: u32,
    kind: TransactionType,
    amount: Money,
) -> anyhow::Result<()> {
    let before = repository.transactions_for(id).len();
    println!("Step {number}: {kind} {amount}");
    match kind {
        TransactionType::Deposit => service.deposit_fund(id.as_str(), amount).await?,
        TransactionType::Withdraw => service.withdraw_fund(id.as_str(), amount).await?,
    };
    settle(kind.as_str(), || repository.transactions_for(id).len() > before).await?;
    if let Some(account) = repository.account(id) {
        println!("  balance now {}\n", account.balance);
    }
    Ok(())
}
