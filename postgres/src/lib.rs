//! `PostgreSQL` account repository for the ledger pipeline.
//!
//! Implements [`AccountRepository`] from `ledger-core` on two tables:
//!
//! ```sql
//! bank_accounts        (id, account_holder, account_type, balance_cents, updated_at)
//! account_transactions (id, seq, account_id, transaction_type, amount_cents, created_at)
//! ```
//!
//! Money is stored as integer cents. The schema ships as embedded `sqlx`
//! migrations; call [`PostgresAccountRepository::migrate`] once at startup.
//!
//! # Example
//!
//! ```ignore
//! use ledger_postgres::PostgresAccountRepository;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = PostgresAccountRepository::connect(
//!         "postgres://localhost/ledger",
//!         10,
//!         Duration::from_secs(30),
//!     )
//!     .await?;
//!     repository.migrate().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::repository::{
    Account, AccountRepository, AccountTransaction, RepositoryError, Result,
};
use ledger_core::{AccountId, AccountType, Money, TransactionId, TransactionType};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;
use uuid::Uuid;

fn storage(context: &'static str) -> impl Fn(sqlx::Error) -> RepositoryError {
    move |e| RepositoryError::Persistence(format!("{context}: {e}"))
}

/// [`AccountRepository`] backed by a `PostgreSQL` connection pool.
#[derive(Clone)]
pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with at most `max_connections` connections. `timeout` bounds both
    /// the initial connect and every later connection acquire.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Persistence`] if the database cannot be reached.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await
            .map_err(storage("Failed to connect"))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Persistence(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_account(row: &PgRow) -> Result<Account> {
        let read = storage("Malformed bank_accounts row");
        let code: i32 = row.try_get("account_type").map_err(&read)?;

        Ok(Account {
            id: AccountId::new(row.try_get::<String, _>("id").map_err(&read)?),
            account_holder: row.try_get("account_holder").map_err(&read)?,
            account_type: AccountType::try_from(code)
                .map_err(|e| RepositoryError::Persistence(e.to_string()))?,
            balance: Money::from_cents(row.try_get("balance_cents").map_err(&read)?),
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<AccountTransaction> {
        let read = storage("Malformed account_transactions row");
        let kind: String = row.try_get("transaction_type").map_err(&read)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(&read)?;

        Ok(AccountTransaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id").map_err(&read)?),
            account_id: AccountId::new(row.try_get::<String, _>("account_id").map_err(&read)?),
            transaction_type: kind
                .parse::<TransactionType>()
                .map_err(|e| RepositoryError::Persistence(e.to_string()))?,
            amount: Money::from_cents(row.try_get("amount_cents").map_err(&read)?),
            created_at,
        })
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO bank_accounts (id, account_holder, account_type, balance_cents, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (id) DO UPDATE
            SET account_holder = EXCLUDED.account_holder,
                account_type = EXCLUDED.account_type,
                balance_cents = EXCLUDED.balance_cents,
                updated_at = now()
            ",
        )
        .bind(account.id.as_str())
        .bind(&account.account_holder)
        .bind(account.account_type.code())
        .bind(account.balance.cents())
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to save account"))?;

        Ok(())
    }

    async fn delete_account(&self, id: &AccountId) -> Result<()> {
        let result = sqlx::query("DELETE FROM bank_accounts WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to delete account"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AccountNotFound(id.clone()));
        }
        Ok(())
    }

    async fn find_account(&self, id: &AccountId) -> Result<Account> {
        let row = sqlx::query(
            "SELECT id, account_holder, account_type, balance_cents FROM bank_accounts WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load account"))?
        .ok_or_else(|| RepositoryError::AccountNotFound(id.clone()))?;

        Self::row_to_account(&row)
    }

    async fn create_transaction(&self, transaction: &AccountTransaction) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO account_transactions (id, account_id, transaction_type, amount_cents, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(*transaction.id.as_uuid())
        .bind(transaction.account_id.as_str())
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount.cents())
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to record transaction"))?;

        Ok(())
    }

    async fn find_transactions(&self, id: &AccountId) -> Result<Vec<AccountTransaction>> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, transaction_type, amount_cents, created_at
            FROM account_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, seq DESC
            ",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load transactions"))?;

        if rows.is_empty() {
            return Err(RepositoryError::TransactionsNotFound(id.clone()));
        }

        rows.iter().map(Self::row_to_transaction).collect()
    }
}
