//! Command intake.
//!
//! [`CommandService`] validates a command, derives exactly one event from it and
//! publishes that event. It never touches the read model; the effect of an accepted
//! command becomes visible only once the dispatcher has applied its event.

use crate::metrics::CommandMetrics;
use crate::publisher::{EventPublisher, PublishError};
use ledger_core::AccountEvent;
use ledger_core::catalog::{
    CloseAccountEvent, DepositFundEvent, OpenAccountEvent, ShowBalanceEvent, ShowTransactionsEvent,
    WithdrawFundEvent,
};
use ledger_core::command::{
    CloseAccount, Command, DepositFund, OpenAccount, ShowBalance, ShowTransactions, Validate,
    ValidationError, WithdrawFund,
};
use ledger_core::environment::IdGenerator;
use ledger_core::{AccountId, AccountType, Money};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why a command had no effect.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command was rejected before any event was derived.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The derived event could not be published.
    #[error("Failed to publish event: {0}")]
    Publish(#[from] PublishError),
}

/// Validates commands and publishes the events derived from them.
///
/// One valid command produces exactly one publish. Nothing is retried here: a
/// publish failure is returned to the caller as is.
pub struct CommandService {
    publisher: Arc<dyn EventPublisher>,
    ids: Arc<dyn IdGenerator>,
}

impl CommandService {
    /// Create a service publishing through `publisher` and drawing new account ids
    /// from `ids`.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { publisher, ids }
    }

    /// Validate, derive and publish.
    ///
    /// Returns the id of the newly opened account for open-account commands and the
    /// caller-supplied id for every other command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] if the command is invalid and
    /// [`CommandError::Publish`] if the event bus did not accept the event. Either
    /// way nothing was published.
    pub async fn submit(&self, command: Command) -> Result<AccountId, CommandError> {
        let name = command.name();

        let event = match self.derive(command) {
            Ok(event) => event,
            Err(e) => {
                warn!(command = name, error = %e, "Command rejected");
                CommandMetrics::record(name, "rejected");
                return Err(e.into());
            }
        };

        let account_id = event.account_id().clone();

        if let Err(e) = self.publisher.publish(&event).await {
            error!(command = name, account_id = %account_id, error = %e, "Command not published");
            CommandMetrics::record(name, "publish_failed");
            return Err(e.into());
        }

        info!(
            command = name,
            account_id = %account_id,
            event_type = event.topic(),
            "Command accepted"
        );
        CommandMetrics::record(name, "accepted");
        Ok(account_id)
    }

    /// Open an account and return its new id.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn open_account(
        &self,
        account_holder: impl Into<String>,
        account_type: AccountType,
        balance: Money,
    ) -> Result<AccountId, CommandError> {
        self.submit(Command::OpenAccount(OpenAccount {
            account_holder: account_holder.into(),
            account_type: account_type.code(),
            balance,
        }))
        .await
    }

    /// Deposit `amount` into account `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn deposit_fund(
        &self,
        id: impl Into<String>,
        amount: Money,
    ) -> Result<AccountId, CommandError> {
        self.submit(Command::DepositFund(DepositFund {
            id: id.into(),
            amount,
        }))
        .await
    }

    /// Withdraw `amount` from account `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn withdraw_fund(
        &self,
        id: impl Into<String>,
        amount: Money,
    ) -> Result<AccountId, CommandError> {
        self.submit(Command::WithdrawFund(WithdrawFund {
            id: id.into(),
            amount,
        }))
        .await
    }

    /// Close account `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn close_account(&self, id: impl Into<String>) -> Result<AccountId, CommandError> {
        self.submit(Command::CloseAccount(CloseAccount { id: id.into() }))
            .await
    }

    /// Request a balance report for account `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn show_balance(&self, id: impl Into<String>) -> Result<AccountId, CommandError> {
        self.submit(Command::ShowBalance(ShowBalance { id: id.into() }))
            .await
    }

    /// Request a transaction history report for account `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn show_transactions(
        &self,
        id: impl Into<String>,
    ) -> Result<AccountId, CommandError> {
        self.submit(Command::ShowTransactions(ShowTransactions { id: id.into() }))
            .await
    }

    /// Validate `command` and derive the one event it stands for.
    fn derive(&self, command: Command) -> Result<AccountEvent, ValidationError> {
        let event = match command {
            Command::OpenAccount(c) => {
                let account_type = c.resolve()?;
                OpenAccountEvent {
                    id: self.ids.account_id(),
                    account_holder: c.account_holder,
                    account_type,
                    balance: c.balance,
                }
                .into()
            }
            Command::DepositFund(c) => {
                c.validate()?;
                DepositFundEvent {
                    id: c.id.into(),
                    amount: c.amount,
                }
                .into()
            }
            Command::WithdrawFund(c) => {
                c.validate()?;
                WithdrawFundEvent {
                    id: c.id.into(),
                    amount: c.amount,
                }
                .into()
            }
            Command::CloseAccount(c) => {
                c.validate()?;
                CloseAccountEvent { id: c.id.into() }.into()
            }
            Command::ShowBalance(c) => {
                c.validate()?;
                ShowBalanceEvent { id: c.id.into() }.into()
            }
            Command::ShowTransactions(c) => {
                c.validate()?;
                ShowTransactionsEvent { id: c.id.into() }.into()
            }
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::publisher::BusPublisher;
    use ledger_testing::{InMemoryEventBus, SequentialIdGenerator};

    fn service(bus: &InMemoryEventBus) -> CommandService {
        CommandService::new(
            Arc::new(BusPublisher::new(Arc::new(bus.clone()))),
            Arc::new(SequentialIdGenerator::new()),
        )
    }

    #[tokio::test]
    async fn open_account_assigns_a_fresh_id() {
        let bus = InMemoryEventBus::new();
        let service = service(&bus);

        let id = service
            .open_account("Alice", AccountType::Checking, Money::from_major(100))
            .await
            .unwrap();

        assert_eq!(id.as_str(), "acc-1");
        let published = bus.published_on("OpenAccountEvent");
        assert_eq!(published.len(), 1);
        assert_eq!(
            AccountEvent::from_serialized(&published[0]).unwrap(),
            OpenAccountEvent {
                id,
                account_holder: "Alice".to_string(),
                account_type: AccountType::Checking,
                balance: Money::from_major(100),
            }
            .into()
        );
    }

    #[tokio::test]
    async fn other_commands_echo_the_supplied_id() {
        let bus = InMemoryEventBus::new();
        let service = service(&bus);

        assert_eq!(service.deposit_fund("acc-9", Money::from_major(5)).await.unwrap().as_str(), "acc-9");
        assert_eq!(service.withdraw_fund("acc-9", Money::from_major(2)).await.unwrap().as_str(), "acc-9");
        assert_eq!(service.show_balance("acc-9").await.unwrap().as_str(), "acc-9");
        assert_eq!(service.show_transactions("acc-9").await.unwrap().as_str(), "acc-9");
        assert_eq!(service.close_account("acc-9").await.unwrap().as_str(), "acc-9");

        let topics: Vec<_> = bus.published().into_iter().map(|e| e.event_type).collect();
        assert_eq!(
            topics,
            vec![
                "DepositFundEvent",
                "WithdrawFundEvent",
                "ShowBalanceEvent",
                "ShowTransactionsEvent",
                "CloseAccountEvent",
            ]
        );
    }

    #[tokio::test]
    async fn invalid_commands_publish_nothing() {
        let bus = InMemoryEventBus::new();
        let service = service(&bus);

        let err = service.deposit_fund("  ", Money::ZERO).await.unwrap_err();
        assert!(matches!(
            &err,
            CommandError::Validation(v) if v.has_field("id") && v.has_field("amount")
        ));

        let err = service
            .submit(Command::OpenAccount(OpenAccount {
                account_holder: "Bob".to_string(),
                account_type: 9,
                balance: Money::from_major(1),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(ref v) if v.has_field("account_type")));

        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn rejected_open_lists_every_field_and_draws_no_id() {
        let bus = InMemoryEventBus::new();
        let service = service(&bus);

        let err = service
            .submit(Command::OpenAccount(OpenAccount {
                account_holder: String::new(),
                account_type: 0,
                balance: Money::ZERO,
            }))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            CommandError::Validation(v)
                if v.has_field("account_holder") && v.has_field("account_type") && v.has_field("balance")
        ));

        let id = service
            .open_account("Carol", AccountType::Savings, Money::from_major(5))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "acc-1");
        assert_eq!(bus.published_on("OpenAccountEvent").len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes("timeout");
        let service = service(&bus);

        let err = service.close_account("acc-1").await.unwrap_err();

        assert!(matches!(err, CommandError::Publish(PublishError::Transport(_))));
        assert!(bus.published().is_empty());
    }
}
