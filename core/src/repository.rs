//! Ledger read model and the repository contract that persists it.
//!
//! The repository is an external collaborator: the pipeline only needs the five
//! operations of [`AccountRepository`] and the distinction between "not found" and
//! every other storage failure.
//!
//! # Implementations
//!
//! - `PostgresAccountRepository` in `ledger-postgres`
//! - `InMemoryAccountRepository` in `ledger-testing`

use crate::money::Money;
use crate::types::{AccountId, AccountType, TransactionId, TransactionType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bank account as persisted in the read model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier (primary key)
    pub id: AccountId,
    /// Account holder name
    pub account_holder: String,
    /// Kind of account
    pub account_type: AccountType,
    /// Current balance
    pub balance: Money,
}

/// An append-only record of one balance change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransaction {
    /// Record identifier
    pub id: TransactionId,
    /// Account the record belongs to
    pub account_id: AccountId,
    /// Deposit or withdraw
    pub transaction_type: TransactionType,
    /// Amount moved (unsigned by convention; the type gives the direction)
    pub amount: Money,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl AccountTransaction {
    /// The record's effect on the balance: positive for deposits, negative for
    /// withdrawals.
    #[must_use]
    pub fn signed_amount(&self) -> Money {
        match self.transaction_type {
            TransactionType::Deposit => self.amount,
            TransactionType::Withdraw => -self.amount,
        }
    }
}

/// Errors returned by repository operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No account with this id exists.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// No transaction records exist for this account.
    #[error("No transactions found for account: {0}")]
    TransactionsNotFound(AccountId),

    /// The storage engine failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RepositoryError {
    /// Returns true for the not-found variants.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::AccountNotFound(_) | Self::TransactionsNotFound(_))
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Durable storage for accounts and their transaction history.
///
/// Each operation is individually atomic. No operation spans a load-modify-save
/// sequence; callers that need one must accept the race.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert the account, or replace the stored row with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Persistence`] if the write fails.
    async fn save_account(&self, account: &Account) -> Result<()>;

    /// Delete the account row. Transaction history is kept.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AccountNotFound`] if there was nothing to delete.
    async fn delete_account(&self, id: &AccountId) -> Result<()>;

    /// Load one account.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AccountNotFound`] if no row has this id.
    async fn find_account(&self, id: &AccountId) -> Result<Account>;

    /// Append a transaction record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Persistence`] if the write fails.
    async fn create_transaction(&self, transaction: &AccountTransaction) -> Result<()>;

    /// Load every record for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::TransactionsNotFound`] if the account has no records.
    async fn find_transactions(&self, id: &AccountId) -> Result<Vec<AccountTransaction>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn signed_amount_follows_direction() {
        let mut record = AccountTransaction {
            id: TransactionId::from_uuid(Uuid::nil()),
            account_id: "acc-1".into(),
            transaction_type: TransactionType::Deposit,
            amount: Money::from_cents(500),
            created_at: Utc::now(),
        };
        assert_eq!(record.signed_amount(), Money::from_cents(500));

        record.transaction_type = TransactionType::Withdraw;
        assert_eq!(record.signed_amount(), Money::from_cents(-500));
    }

    #[test]
    fn not_found_classification() {
        assert!(RepositoryError::AccountNotFound("a".into()).is_not_found());
        assert!(RepositoryError::TransactionsNotFound("a".into()).is_not_found());
        assert!(!RepositoryError::Persistence("disk full".into()).is_not_found());
    }
}
