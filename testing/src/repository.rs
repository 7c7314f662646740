//! In-memory account repository.
//!
//! Mirrors the Postgres repository's semantics (upsert on save, not-found on empty
//! deletes and histories, newest-first history) and lets tests make individual
//! operations fail.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use async_trait::async_trait;
use ledger_core::repository::{
    Account, AccountRepository, AccountTransaction, RepositoryError, Result,
};
use ledger_core::types::AccountId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// One of the five repository operations, for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// `save_account`
    SaveAccount,
    /// `delete_account`
    DeleteAccount,
    /// `find_account`
    FindAccount,
    /// `create_transaction`
    CreateTransaction,
    /// `find_transactions`
    FindTransactions,
}

#[derive(Default)]
struct RepositoryState {
    accounts: HashMap<AccountId, Account>,
    transactions: Vec<AccountTransaction>,
    failing: HashSet<RepositoryOperation>,
}

/// `HashMap`-backed [`AccountRepository`].
///
/// # Example
///
/// ```
/// use ledger_testing::InMemoryAccountRepository;
/// use ledger_core::repository::{Account, AccountRepository};
/// use ledger_core::{AccountType, Money};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repository = InMemoryAccountRepository::new();
/// let account = Account {
///     id: "acc-1".into(),
///     account_holder: "Alice".to_string(),
///     account_type: AccountType::Checking,
///     balance: Money::from_major(100),
/// };
/// repository.save_account(&account).await?;
/// assert_eq!(repository.find_account(&account.id).await?, account);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryAccountRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryAccountRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail with a persistence error until [`Self::recover`].
    pub fn fail_on(&self, operation: RepositoryOperation) {
        self.state.write().unwrap().failing.insert(operation);
    }

    /// Clear every injected failure.
    pub fn recover(&self) {
        self.state.write().unwrap().failing.clear();
    }

    /// Stored account, if any.
    #[must_use]
    pub fn account(&self, id: &AccountId) -> Option<Account> {
        self.state.read().unwrap().accounts.get(id).cloned()
    }

    /// Number of stored accounts.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.state.read().unwrap().accounts.len()
    }

    /// Records for one account in insertion order.
    #[must_use]
    pub fn transactions_for(&self, id: &AccountId) -> Vec<AccountTransaction> {
        self.state
            .read()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| &t.account_id == id)
            .cloned()
            .collect()
    }

    /// Total number of records across all accounts.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.state.read().unwrap().transactions.len()
    }

    fn check(&self, operation: RepositoryOperation) -> Result<()> {
        if self.state.read().unwrap().failing.contains(&operation) {
            Err(RepositoryError::Persistence(format!(
                "injected failure for {operation:?}"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn save_account(&self, account: &Account) -> Result<()> {
        self.check(RepositoryOperation::SaveAccount)?;
        self.state
            .write()
            .unwrap()
            .accounts
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn delete_account(&self, id: &AccountId) -> Result<()> {
        self.check(RepositoryOperation::DeleteAccount)?;
        self.state
            .write()
            .unwrap()
            .accounts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::AccountNotFound(id.clone()))
    }

    async fn find_account(&self, id: &AccountId) -> Result<Account> {
        self.check(RepositoryOperation::FindAccount)?;
        self.account(id)
            .ok_or_else(|| RepositoryError::AccountNotFound(id.clone()))
    }

    async fn create_transaction(&self, transaction: &AccountTransaction) -> Result<()> {
        self.check(RepositoryOperation::CreateTransaction)?;
        self.state
            .write()
            .unwrap()
            .transactions
            .push(transaction.clone());
        Ok(())
    }

    async fn find_transactions(&self, id: &AccountId) -> Result<Vec<AccountTransaction>> {
        self.check(RepositoryOperation::FindTransactions)?;

        // Newest first; records sharing a timestamp keep reverse insertion order.
        let mut records = self.transactions_for(id);
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if records.is_empty() {
            return Err(RepositoryError::TransactionsNotFound(id.clone()));
        }
        Ok(records)
    }
}
