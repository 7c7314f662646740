//! Account event handler.
//!
//! Applies one decoded [`AccountEvent`] to the read model. Every event either fully
//! applies, or stops at the first repository error: a failed save means no
//! transaction record is appended for that event.
//!
//! Mutations follow a load-modify-save sequence without a transaction around it.
//! Two concurrent handlers for the same account can lose an update; per-kind topics
//! are handled one event at a time, which narrows but does not close that race.

use async_trait::async_trait;
use ledger_core::catalog::{
    CloseAccountEvent, DepositFundEvent, OpenAccountEvent, ShowBalanceEvent, ShowTransactionsEvent,
    WithdrawFundEvent,
};
use ledger_core::environment::{Clock, IdGenerator};
use ledger_core::repository::{Account, AccountRepository, AccountTransaction, RepositoryError};
use ledger_core::{AccountEvent, AccountId, Money, TransactionType};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Why an event was not (fully) applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The account or its history does not exist. The event is dropped.
    #[error(transparent)]
    NotFound(RepositoryError),

    /// The repository failed. Remaining side effects were skipped.
    #[error(transparent)]
    Persistence(RepositoryError),
}

impl From<RepositoryError> for HandlerError {
    fn from(error: RepositoryError) -> Self {
        if error.is_not_found() {
            Self::NotFound(error)
        } else {
            Self::Persistence(error)
        }
    }
}

/// What handling an event produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The read model was updated.
    Applied,

    /// Balance report.
    Balance {
        /// Reported account
        account_id: AccountId,
        /// Its current balance
        balance: Money,
    },

    /// Transaction history report, newest first.
    History {
        /// Reported account
        account_id: AccountId,
        /// Its records
        transactions: Vec<AccountTransaction>,
    },
}

/// Handler for decoded events.
///
/// # Thread Safety
///
/// Implementors must be `Send + Sync + 'static` because one handler is shared by
/// every dispatcher worker.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if a repository call failed. Side effects that would
    /// have followed the failing call did not happen.
    async fn handle(&self, event: AccountEvent) -> Result<HandleOutcome, HandlerError>;
}

/// Applies ledger events to an [`AccountRepository`].
pub struct AccountEventHandler {
    repository: Arc<dyn AccountRepository>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl AccountEventHandler {
    /// Create a handler writing to `repository`, stamping records with `clock` and
    /// naming them with `ids`.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AccountRepository>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            repository,
            clock,
            ids,
        }
    }

    async fn record(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        amount: Money,
    ) -> Result<(), RepositoryError> {
        let transaction = AccountTransaction {
            id: self.ids.transaction_id(),
            account_id: account_id.clone(),
            transaction_type,
            amount,
            created_at: self.clock.now(),
        };
        self.repository.create_transaction(&transaction).await
    }

    async fn open(&self, event: OpenAccountEvent) -> Result<HandleOutcome, RepositoryError> {
        let account = Account {
            id: event.id,
            account_holder: event.account_holder,
            account_type: event.account_type,
            balance: event.balance,
        };
        self.repository.save_account(&account).await?;
        self.record(&account.id, TransactionType::Deposit, account.balance)
            .await?;

        info!(
            account_id = %account.id,
            account_type = %account.account_type,
            balance = %account.balance,
            "Account opened"
        );
        Ok(HandleOutcome::Applied)
    }

    async fn adjust(
        &self,
        id: &AccountId,
        transaction_type: TransactionType,
        amount: Money,
    ) -> Result<HandleOutcome, RepositoryError> {
        let mut account = self.repository.find_account(id).await?;
        match transaction_type {
            TransactionType::Deposit => account.balance += amount,
            TransactionType::Withdraw => account.balance -= amount,
        }
        self.repository.save_account(&account).await?;
        self.record(id, transaction_type, amount).await?;

        info!(
            account_id = %id,
            transaction_type = %transaction_type,
            amount = %amount,
            balance = %account.balance,
            "Balance updated"
        );
        Ok(HandleOutcome::Applied)
    }

    async fn close(&self, event: CloseAccountEvent) -> Result<HandleOutcome, RepositoryError> {
        self.repository.delete_account(&event.id).await?;
        info!(account_id = %event.id, "Account closed");
        Ok(HandleOutcome::Applied)
    }

    async fn balance(&self, event: ShowBalanceEvent) -> Result<HandleOutcome, RepositoryError> {
        let account = self.repository.find_account(&event.id).await?;
        info!(
            account_id = %account.id,
            account_holder = %account.account_holder,
            balance = %account.balance,
            "Account balance"
        );
        Ok(HandleOutcome::Balance {
            account_id: account.id,
            balance: account.balance,
        })
    }

    async fn history(
        &self,
        event: ShowTransactionsEvent,
    ) -> Result<HandleOutcome, RepositoryError> {
        let transactions = self.repository.find_transactions(&event.id).await?;
        for transaction in &transactions {
            info!(
                account_id = %event.id,
                transaction_id = %transaction.id,
                transaction_type = %transaction.transaction_type,
                amount = %transaction.amount,
                created_at = %transaction.created_at,
                "Account transaction"
            );
        }
        Ok(HandleOutcome::History {
            account_id: event.id,
            transactions,
        })
    }
}

#[async_trait]
impl EventHandler for AccountEventHandler {
    async fn handle(&self, event: AccountEvent) -> Result<HandleOutcome, HandlerError> {
        debug!(event_type = event.topic(), account_id = %event.account_id(), "Handling event");

        let outcome = match event {
            AccountEvent::OpenAccount(e) => self.open(e).await,
            AccountEvent::DepositFund(DepositFundEvent { id, amount }) => {
                self.adjust(&id, TransactionType::Deposit, amount).await
            }
            AccountEvent::WithdrawFund(WithdrawFundEvent { id, amount }) => {
                self.adjust(&id, TransactionType::Withdraw, amount).await
            }
            AccountEvent::CloseAccount(e) => self.close(e).await,
            AccountEvent::ShowBalance(e) => self.balance(e).await,
            AccountEvent::ShowTransactions(e) => self.history(e).await,
        };

        Ok(outcome?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use ledger_core::AccountType;
    use ledger_testing::{
        InMemoryAccountRepository, RepositoryOperation, SequentialIdGenerator, stepping_clock,
    };

    fn setup() -> (InMemoryAccountRepository, AccountEventHandler) {
        let repository = InMemoryAccountRepository::new();
        let handler = AccountEventHandler::new(
            Arc::new(repository.clone()),
            Arc::new(stepping_clock()),
            Arc::new(SequentialIdGenerator::new()),
        );
        (repository, handler)
    }

    fn open(id: &str, balance: i64) -> AccountEvent {
        OpenAccountEvent {
            id: id.into(),
            account_holder: "Alice".to_string(),
            account_type: AccountType::Savings,
            balance: Money::from_major(balance),
        }
        .into()
    }

    fn deposit(id: &str, amount: i64) -> AccountEvent {
        DepositFundEvent {
            id: id.into(),
            amount: Money::from_major(amount),
        }
        .into()
    }

    fn withdraw(id: &str, amount: i64) -> AccountEvent {
        WithdrawFundEvent {
            id: id.into(),
            amount: Money::from_major(amount),
        }
        .into()
    }

    #[tokio::test]
    async fn open_saves_account_and_initial_deposit() {
        let (repository, handler) = setup();

        let outcome = handler.handle(open("acc-1", 100)).await.unwrap();

        assert_eq!(outcome, HandleOutcome::Applied);
        let account = repository.account(&"acc-1".into()).unwrap();
        assert_eq!(account.balance, Money::from_major(100));
        assert_eq!(account.account_type, AccountType::Savings);

        let records = repository.transactions_for(&"acc-1".into());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transaction_type, TransactionType::Deposit);
        assert_eq!(records[0].amount, Money::from_major(100));
    }

    #[tokio::test]
    async fn withdraw_may_overdraw() {
        let (repository, handler) = setup();
        handler.handle(open("acc-1", 10)).await.unwrap();

        handler.handle(withdraw("acc-1", 25)).await.unwrap();

        assert_eq!(
            repository.account(&"acc-1".into()).unwrap().balance,
            Money::from_major(-15)
        );
    }

    #[tokio::test]
    async fn deposit_to_unknown_account_is_not_found() {
        let (repository, handler) = setup();

        let err = handler.handle(deposit("ghost", 10)).await.unwrap_err();

        assert_eq!(err, HandlerError::NotFound(RepositoryError::AccountNotFound("ghost".into())));
        assert_eq!(repository.account_count(), 0);
        assert_eq!(repository.transaction_count(), 0);
    }

    #[tokio::test]
    async fn failed_save_skips_the_record() {
        let (repository, handler) = setup();
        handler.handle(open("acc-1", 10)).await.unwrap();
        repository.fail_on(RepositoryOperation::SaveAccount);

        let err = handler.handle(deposit("acc-1", 5)).await.unwrap_err();

        assert!(matches!(err, HandlerError::Persistence(_)));
        assert_eq!(repository.transactions_for(&"acc-1".into()).len(), 1);
        assert_eq!(repository.account(&"acc-1".into()).unwrap().balance, Money::from_major(10));
    }

    #[tokio::test]
    async fn close_keeps_history() {
        let (repository, handler) = setup();
        handler.handle(open("acc-1", 10)).await.unwrap();
        handler.handle(deposit("acc-1", 5)).await.unwrap();

        handler
            .handle(CloseAccountEvent { id: "acc-1".into() }.into())
            .await
            .unwrap();

        assert!(repository.account(&"acc-1".into()).is_none());
        let history = handler
            .handle(ShowTransactionsEvent { id: "acc-1".into() }.into())
            .await
            .unwrap();
        assert!(matches!(history, HandleOutcome::History { ref transactions, .. } if transactions.len() == 2));

        let err = handler
            .handle(ShowBalanceEvent { id: "acc-1".into() }.into())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }

    #[tokio::test]
    async fn closing_twice_is_not_found() {
        let (_, handler) = setup();
        handler.handle(open("acc-1", 10)).await.unwrap();
        let close: AccountEvent = CloseAccountEvent { id: "acc-1".into() }.into();

        handler.handle(close.clone()).await.unwrap();

        assert!(matches!(handler.handle(close).await, Err(HandlerError::NotFound(_))));
    }

    #[tokio::test]
    async fn reports_balance_and_newest_first_history() {
        let (_, handler) = setup();
        handler.handle(open("acc-1", 100)).await.unwrap();
        handler.handle(deposit("acc-1", 50)).await.unwrap();
        handler.handle(withdraw("acc-1", 30)).await.unwrap();

        let balance = handler
            .handle(ShowBalanceEvent { id: "acc-1".into() }.into())
            .await
            .unwrap();
        assert_eq!(
            balance,
            HandleOutcome::Balance {
                account_id: "acc-1".into(),
                balance: Money::from_major(120),
            }
        );

        let HandleOutcome::History { transactions, .. } = handler
            .handle(ShowTransactionsEvent { id: "acc-1".into() }.into())
            .await
            .unwrap()
        else {
            unreachable!("history query returns a history");
        };
        let amounts: Vec<_> = transactions.iter().map(AccountTransaction::signed_amount).collect();
        assert_eq!(
            amounts,
            vec![Money::from_major(-30), Money::from_major(50), Money::from_major(100)]
        );
    }
}
