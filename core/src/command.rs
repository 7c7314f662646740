//! Commands and their validation rules.
//!
//! A command is a request to change (or report on) the ledger. It lives only for
//! the duration of one request: the transport adapter builds it, the command
//! service validates it and turns it into exactly one event.
//!
//! Validation collects every violation of a command rather than stopping at the
//! first one, so a caller can fix a request in one round trip.

use crate::money::Money;
use crate::types::AccountType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a single field was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Required text was empty or whitespace.
    Missing,
    /// A monetary amount was zero.
    Zero,
    /// The account type code is not one of the known types.
    UnknownAccountType(i32),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("is required"),
            Self::Zero => f.write_str("must not be zero"),
            Self::UnknownAccountType(code) => write!(f, "unknown account type {code}"),
        }
    }
}

/// A rejected field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Field name as it appears in the request
    pub field: &'static str,
    /// What was wrong with it
    pub violation: Violation,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.violation)
    }
}

/// A command failed validation. No event was derived from it.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("Invalid {command} command: {}", render(.violations))]
pub struct ValidationError {
    /// Name of the rejected command
    pub command: &'static str,
    /// Every rejected field, in field order
    pub violations: Vec<FieldViolation>,
}

fn render(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    /// Returns true if `field` was rejected.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Accumulates violations for one command.
struct Checker {
    command: &'static str,
    violations: Vec<FieldViolation>,
}

impl Checker {
    const fn new(command: &'static str) -> Self {
        Self {
            command,
            violations: Vec::new(),
        }
    }

    fn reject(&mut self, field: &'static str, violation: Violation) {
        self.violations.push(FieldViolation { field, violation });
    }

    fn required(&mut self, field: &'static str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.reject(field, Violation::Missing);
        }
        self
    }

    fn non_zero(&mut self, field: &'static str, value: Money) -> &mut Self {
        if value.is_zero() {
            self.reject(field, Violation::Zero);
        }
        self
    }

    fn account_type(&mut self, field: &'static str, code: i32) -> Option<AccountType> {
        let parsed = AccountType::try_from(code).ok();
        if parsed.is_none() {
            self.reject(field, Violation::UnknownAccountType(code));
        }
        parsed
    }

    fn finish(&mut self) -> Result<(), ValidationError> {
        self.finish_with(Some(()))
    }

    /// `value` is `None` only when the check that produced it rejected a field.
    fn finish_with<T>(&mut self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(value) if self.violations.is_empty() => Ok(value),
            _ => Err(ValidationError {
                command: self.command,
                violations: std::mem::take(&mut self.violations),
            }),
        }
    }
}

/// Structural and business validation for a command.
pub trait Validate {
    /// Checks the command.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every invalid field.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Open a new account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    /// Account holder name
    pub account_holder: String,
    /// Account type code (see [`AccountType`])
    pub account_type: i32,
    /// Opening balance
    pub balance: Money,
}

/// Deposit funds into an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFund {
    /// Target account id
    pub id: String,
    /// Amount to add
    pub amount: Money,
}

/// Withdraw funds from an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFund {
    /// Target account id
    pub id: String,
    /// Amount to remove
    pub amount: Money,
}

/// Close an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAccount {
    /// Account id
    pub id: String,
}

/// Report an account's balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowBalance {
    /// Account id
    pub id: String,
}

/// Report an account's transaction history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowTransactions {
    /// Account id
    pub id: String,
}

impl OpenAccount {
    /// Validate the command and return its resolved account type.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every invalid field.
    pub fn resolve(&self) -> Result<AccountType, ValidationError> {
        let mut checker = Checker::new(Command::OPEN_ACCOUNT);
        checker.required("account_holder", &self.account_holder);
        let account_type = checker.account_type("account_type", self.account_type);
        checker.non_zero("balance", self.balance);
        checker.finish_with(account_type)
    }
}

impl Validate for OpenAccount {
    fn validate(&self) -> Result<(), ValidationError> {
        self.resolve().map(|_| ())
    }
}

impl Validate for DepositFund {
    fn validate(&self) -> Result<(), ValidationError> {
        Checker::new(Command::DEPOSIT_FUND)
            .required("id", &self.id)
            .non_zero("amount", self.amount)
            .finish()
    }
}

impl Validate for WithdrawFund {
    fn validate(&self) -> Result<(), ValidationError> {
        Checker::new(Command::WITHDRAW_FUND)
            .required("id", &self.id)
            .non_zero("amount", self.amount)
            .finish()
    }
}

impl Validate for CloseAccount {
    fn validate(&self) -> Result<(), ValidationError> {
        Checker::new(Command::CLOSE_ACCOUNT).required("id", &self.id).finish()
    }
}

impl Validate for ShowBalance {
    fn validate(&self) -> Result<(), ValidationError> {
        Checker::new(Command::SHOW_BALANCE).required("id", &self.id).finish()
    }
}

impl Validate for ShowTransactions {
    fn validate(&self) -> Result<(), ValidationError> {
        Checker::new(Command::SHOW_TRANSACTIONS).required("id", &self.id).finish()
    }
}

/// Any supported command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// See [`OpenAccount`]
    OpenAccount(OpenAccount),
    /// See [`DepositFund`]
    DepositFund(DepositFund),
    /// See [`WithdrawFund`]
    WithdrawFund(WithdrawFund),
    /// See [`CloseAccount`]
    CloseAccount(CloseAccount),
    /// See [`ShowBalance`]
    ShowBalance(ShowBalance),
    /// See [`ShowTransactions`]
    ShowTransactions(ShowTransactions),
}

impl Command {
    const OPEN_ACCOUNT: &'static str = "open_account";
    const DEPOSIT_FUND: &'static str = "deposit_fund";
    const WITHDRAW_FUND: &'static str = "withdraw_fund";
    const CLOSE_ACCOUNT: &'static str = "close_account";
    const SHOW_BALANCE: &'static str = "show_balance";
    const SHOW_TRANSACTIONS: &'static str = "show_transactions";

    /// Stable command name, used in logs and metrics labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAccount(_) => Self::OPEN_ACCOUNT,
            Self::DepositFund(_) => Self::DEPOSIT_FUND,
            Self::WithdrawFund(_) => Self::WITHDRAW_FUND,
            Self::CloseAccount(_) => Self::CLOSE_ACCOUNT,
            Self::ShowBalance(_) => Self::SHOW_BALANCE,
            Self::ShowTransactions(_) => Self::SHOW_TRANSACTIONS,
        }
    }
}

impl Validate for Command {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::OpenAccount(c) => c.validate(),
            Self::DepositFund(c) => c.validate(),
            Self::WithdrawFund(c) => c.validate(),
            Self::CloseAccount(c) => c.validate(),
            Self::ShowBalance(c) => c.validate(),
            Self::ShowTransactions(c) => c.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn open(holder: &str, account_type: i32, balance: i64) -> OpenAccount {
        OpenAccount {
            account_holder: holder.to_string(),
            account_type,
            balance: Money::from_cents(balance),
        }
    }

    #[test]
    fn valid_open_account_passes() {
        assert_eq!(open("Alice", 1, 10_000).validate(), Ok(()));
    }

    #[test]
    fn open_account_collects_every_violation() {
        let err = open("   ", 0, 0).validate().unwrap_err();

        assert_eq!(err.command, "open_account");
        assert_eq!(
            err.violations,
            vec![
                FieldViolation { field: "account_holder", violation: Violation::Missing },
                FieldViolation { field: "account_type", violation: Violation::UnknownAccountType(0) },
                FieldViolation { field: "balance", violation: Violation::Zero },
            ]
        );
        assert_eq!(
            err.to_string(),
            "Invalid open_account command: account_holder is required, \
             account_type unknown account type 0, balance must not be zero"
        );
    }

    #[test]
    fn resolve_returns_the_parsed_account_type() {
        assert_eq!(open("Alice", 3, 100).resolve(), Ok(AccountType::FixedDeposit));

        let err = open("Alice", 7, 0).resolve().unwrap_err();
        assert_eq!(
            err.violations,
            vec![
                FieldViolation { field: "account_type", violation: Violation::UnknownAccountType(7) },
                FieldViolation { field: "balance", violation: Violation::Zero },
            ]
        );
    }

    #[test]
    fn negative_opening_balance_is_allowed() {
        assert_eq!(open("Bob", 2, -500).validate(), Ok(()));
    }

    #[test]
    fn deposit_requires_id_and_amount() {
        let err = DepositFund { id: String::new(), amount: Money::ZERO }.validate().unwrap_err();
        assert!(err.has_field("id"));
        assert!(err.has_field("amount"));
    }

    #[test]
    fn negative_withdrawal_is_not_rejected() {
        let command = WithdrawFund { id: "acc-1".to_string(), amount: Money::from_cents(-100) };
        assert_eq!(command.validate(), Ok(()));
    }

    #[test]
    fn queries_require_id() {
        let commands = [
            Command::CloseAccount(CloseAccount { id: String::new() }),
            Command::ShowBalance(ShowBalance { id: " ".to_string() }),
            Command::ShowTransactions(ShowTransactions { id: String::new() }),
        ];

        for command in commands {
            let err = command.validate().unwrap_err();
            assert_eq!(err.command, command.name());
            assert!(err.has_field("id"));
        }
    }

    #[test]
    fn command_deserializes_from_tagged_json() {
        let command: Command = serde_json::from_value(serde_json::json!({
            "command": "deposit_fund",
            "id": "acc-1",
            "amount": 5000,
        }))
        .unwrap();

        assert_eq!(
            command,
            Command::DepositFund(DepositFund { id: "acc-1".to_string(), amount: Money::from_cents(5000) })
        );
    }
}
