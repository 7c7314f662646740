//! Identifier and enumeration types shared by commands, events and the read model.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a bank account.
///
/// Assigned once when the account is opened and stable for its whole life. The
/// value is opaque: any non-empty string received from the transport is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an identifier from a UUID.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id.to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a transaction record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a `TransactionId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned when an integer code does not name an [`AccountType`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown account type code: {0}")]
pub struct UnknownAccountType(pub i32);

/// Kind of bank account.
///
/// Travels on the wire as its integer code. Code `0` is reserved for "unset"
/// and never names a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AccountType {
    /// Everyday transactional account.
    Checking,
    /// Interest-bearing savings account.
    Savings,
    /// Term deposit account.
    FixedDeposit,
}

impl AccountType {
    /// Every account type, in code order.
    pub const ALL: [Self; 3] = [Self::Checking, Self::Savings, Self::FixedDeposit];

    /// Integer code of this type.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Checking => 1,
            Self::Savings => 2,
            Self::FixedDeposit => 3,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::FixedDeposit => "fixed_deposit",
        }
    }
}

impl TryFrom<i32> for AccountType {
    type Error = UnknownAccountType;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(UnknownAccountType(code))
    }
}

impl From<AccountType> for i32 {
    fn from(account_type: AccountType) -> Self {
        account_type.code()
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a [`TransactionType`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

/// Direction of a balance-affecting transaction record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money added to the account (including the opening balance).
    Deposit,
    /// Money taken out of the account.
    Withdraw,
}

impl TransactionType {
    /// Stable lower-case name, as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdraw" => Ok(Self::Withdraw),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
