//! The closed catalog of ledger events.
//!
//! Every event kind has one payload struct and one topic. [`EventKind::ALL`] drives
//! subscription on the consumer side and [`EventKind::from_topic`] maps an inbound
//! topic back to its payload type. Both are exhaustive matches, so adding a kind is
//! one new variant plus one payload struct and the compiler points at every place
//! that needs to learn about it.
//!
//! # Topics
//!
//! | Kind | Topic |
//! |---|---|
//! | `OpenAccount` | `OpenAccountEvent` |
//! | `DepositFund` | `DepositFundEvent` |
//! | `WithdrawFund` | `WithdrawFundEvent` |
//! | `CloseAccount` | `CloseAccountEvent` |
//! | `ShowBalance` | `ShowBalanceEvent` |
//! | `ShowTransactions` | `ShowTransactionsEvent` |
//!
//! Payloads are JSON with snake_case fields; money travels as integer cents.

use crate::event::{Event, EventError, SerializedEvent};
use crate::money::Money;
use crate::types::{AccountId, AccountType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a ledger event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// An account was opened with an initial balance.
    OpenAccount,
    /// Funds were deposited.
    DepositFund,
    /// Funds were withdrawn.
    WithdrawFund,
    /// An account was closed.
    CloseAccount,
    /// A balance report was requested.
    ShowBalance,
    /// A transaction history report was requested.
    ShowTransactions,
}

impl EventKind {
    /// Every kind in the catalog.
    pub const ALL: [Self; 6] = [
        Self::OpenAccount,
        Self::DepositFund,
        Self::WithdrawFund,
        Self::CloseAccount,
        Self::ShowBalance,
        Self::ShowTransactions,
    ];

    /// Topic name this kind travels on.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::OpenAccount => "OpenAccountEvent",
            Self::DepositFund => "DepositFundEvent",
            Self::WithdrawFund => "WithdrawFundEvent",
            Self::CloseAccount => "CloseAccountEvent",
            Self::ShowBalance => "ShowBalanceEvent",
            Self::ShowTransactions => "ShowTransactionsEvent",
        }
    }

    /// Maps a topic name back to its kind.
    ///
    /// Returns `None` for topics outside the catalog.
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == topic)
    }

    /// Topic names of every kind, for subscription.
    #[must_use]
    pub fn topics() -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.topic()).collect()
    }

    /// Whether events of this kind change the read model.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::ShowBalance | Self::ShowTransactions)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// An account was opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccountEvent {
    /// Newly assigned account id
    pub id: AccountId,
    /// Account holder name
    pub account_holder: String,
    /// Kind of account
    pub account_type: AccountType,
    /// Opening balance
    pub balance: Money,
}

/// Funds were deposited into an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFundEvent {
    /// Target account
    pub id: AccountId,
    /// Amount added
    pub amount: Money,
}

/// Funds were withdrawn from an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFundEvent {
    /// Target account
    pub id: AccountId,
    /// Amount removed
    pub amount: Money,
}

/// An account was closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAccountEvent {
    /// Closed account
    pub id: AccountId,
}

/// A balance report was requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowBalanceEvent {
    /// Account to report on
    pub id: AccountId,
}

/// A transaction history report was requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowTransactionsEvent {
    /// Account to report on
    pub id: AccountId,
}

impl Event for OpenAccountEvent {
    const KIND: EventKind = EventKind::OpenAccount;

    fn account_id(&self) -> &AccountId {
        &self.id
    }
}

impl Event for DepositFundEvent {
    const KIND: EventKind = EventKind::DepositFund;

    fn account_id(&self) -> &AccountId {
        &self.id
    }
}

impl Event for WithdrawFundEvent {
    const KIND: EventKind = EventKind::WithdrawFund;

    fn account_id(&self) -> &AccountId {
        &self.id
    }
}

impl Event for CloseAccountEvent {
    const KIND: EventKind = EventKind::CloseAccount;

    fn account_id(&self) -> &AccountId {
        &self.id
    }
}

impl Event for ShowBalanceEvent {
    const KIND: EventKind = EventKind::ShowBalance;

    fn account_id(&self) -> &AccountId {
        &self.id
    }
}

impl Event for ShowTransactionsEvent {
    const KIND: EventKind = EventKind::ShowTransactions;

    fn account_id(&self) -> &AccountId {
        &self.id
    }
}

/// Any event in the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    /// See [`OpenAccountEvent`]
    OpenAccount(OpenAccountEvent),
    /// See [`DepositFundEvent`]
    DepositFund(DepositFundEvent),
    /// See [`WithdrawFundEvent`]
    WithdrawFund(WithdrawFundEvent),
    /// See [`CloseAccountEvent`]
    CloseAccount(CloseAccountEvent),
    /// See [`ShowBalanceEvent`]
    ShowBalance(ShowBalanceEvent),
    /// See [`ShowTransactionsEvent`]
    ShowTransactions(ShowTransactionsEvent),
}

impl AccountEvent {
    /// Catalog kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::OpenAccount(_) => EventKind::OpenAccount,
            Self::DepositFund(_) => EventKind::DepositFund,
            Self::WithdrawFund(_) => EventKind::WithdrawFund,
            Self::CloseAccount(_) => EventKind::CloseAccount,
            Self::ShowBalance(_) => EventKind::ShowBalance,
            Self::ShowTransactions(_) => EventKind::ShowTransactions,
        }
    }

    /// The account this event is about.
    #[must_use]
    pub fn account_id(&self) -> &AccountId {
        match self {
            Self::OpenAccount(e) => e.account_id(),
            Self::DepositFund(e) => e.account_id(),
            Self::WithdrawFund(e) => e.account_id(),
            Self::CloseAccount(e) => e.account_id(),
            Self::ShowBalance(e) => e.account_id(),
            Self::ShowTransactions(e) => e.account_id(),
        }
    }

    /// Topic this event is published to.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        self.kind().topic()
    }

    /// Serialize into the transport envelope.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the payload cannot be serialized.
    pub fn encode(&self) -> Result<SerializedEvent, EventError> {
        match self {
            Self::OpenAccount(e) => SerializedEvent::from_event(e),
            Self::DepositFund(e) => SerializedEvent::from_event(e),
            Self::WithdrawFund(e) => SerializedEvent::from_event(e),
            Self::CloseAccount(e) => SerializedEvent::from_event(e),
            Self::ShowBalance(e) => SerializedEvent::from_event(e),
            Self::ShowTransactions(e) => SerializedEvent::from_event(e),
        }
    }

    /// Deserialize a payload of a known kind.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if `bytes` is not a valid payload
    /// for `kind`.
    pub fn decode(kind: EventKind, bytes: &[u8]) -> Result<Self, EventError> {
        Ok(match kind {
            EventKind::OpenAccount => Self::OpenAccount(OpenAccountEvent::from_bytes(bytes)?),
            EventKind::DepositFund => Self::DepositFund(DepositFundEvent::from_bytes(bytes)?),
            EventKind::WithdrawFund => Self::WithdrawFund(WithdrawFundEvent::from_bytes(bytes)?),
            EventKind::CloseAccount => Self::CloseAccount(CloseAccountEvent::from_bytes(bytes)?),
            EventKind::ShowBalance => Self::ShowBalance(ShowBalanceEvent::from_bytes(bytes)?),
            EventKind::ShowTransactions => {
                Self::ShowTransactions(ShowTransactionsEvent::from_bytes(bytes)?)
            },
        })
    }

    /// Deserialize a transport envelope, resolving the kind from its topic.
    ///
    /// # Errors
    ///
    /// Returns `EventError::UnknownEventType` for topics outside the catalog and
    /// `EventError::DeserializationError` for malformed payloads.
    pub fn from_serialized(event: &SerializedEvent) -> Result<Self, EventError> {
        let kind = EventKind::from_topic(&event.event_type)
            .ok_or_else(|| EventError::UnknownEventType(event.event_type.clone()))?;
        Self::decode(kind, &event.data)
    }
}

impl From<OpenAccountEvent> for AccountEvent {
    fn from(event: OpenAccountEvent) -> Self {
        Self::OpenAccount(event)
    }
}

impl From<DepositFundEvent> for AccountEvent {
    fn from(event: DepositFundEvent) -> Self {
        Self::DepositFund(event)
    }
}

impl From<WithdrawFundEvent> for AccountEvent {
    fn from(event: WithdrawFundEvent) -> Self {
        Self::WithdrawFund(event)
    }
}

impl From<CloseAccountEvent> for AccountEvent {
    fn from(event: CloseAccountEvent) -> Self {
        Self::CloseAccount(event)
    }
}

impl From<ShowBalanceEvent> for AccountEvent {
    fn from(event: ShowBalanceEvent) -> Self {
        Self::ShowBalance(event)
    }
}

impl From<ShowTransactionsEvent> for AccountEvent {
    fn from(event: ShowTransactionsEvent) -> Self {
        Self::ShowTransactions(event)
    }
}
