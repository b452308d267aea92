//! Double-entry ledger models
//!
//! A transaction is a dated exchange of funds between accounts and
//! envelopes. The money itself moves through splits: account splits record
//! the change against real-world accounts, envelope splits record the change
//! against budgeted envelopes. A balanced transaction has equal account and
//! envelope sums.
//!
//! IDs at or below zero mark records that have not yet been persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::money::Money;

/// A real-world account (bank account, credit card, cash on hand)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Persistence ID, `<= 0` when unpersisted
    pub id: i64,

    /// Account name
    pub name: String,
}

impl Account {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A budgeting envelope against which funds are earmarked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Persistence ID, `<= 0` when unpersisted
    pub id: i64,

    /// Envelope name
    pub name: String,
}

impl Envelope {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A dated exchange of funds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Persistence ID, `<= 0` when unpersisted
    pub id: i64,

    /// Date on which the exchange occurred
    pub date: Option<NaiveDate>,

    /// Payee description
    pub payee: String,
}

impl Transaction {
    pub fn new(date: NaiveDate, payee: impl Into<String>) -> Self {
        Self {
            id: 0,
            date: Some(date),
            payee: payee.into(),
        }
    }
}

/// An account-side split of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    /// Persistence ID, `<= 0` when unpersisted
    pub id: i64,

    /// ID of the owning transaction
    pub transaction_id: i64,

    /// Account against which the split applies
    pub account: Account,

    /// Signed amount of the split
    pub amount: Money,

    /// Split memo
    pub memo: String,

    /// Whether the split has cleared the account
    pub cleared: bool,
}

impl AccountTransaction {
    pub fn new(account: Account, amount: Money) -> Self {
        Self {
            id: 0,
            transaction_id: 0,
            account,
            amount,
            memo: String::new(),
            cleared: false,
        }
    }
}

/// An envelope-side split of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeTransaction {
    /// Persistence ID, `<= 0` when unpersisted
    pub id: i64,

    /// ID of the owning transaction
    pub transaction_id: i64,

    /// Envelope against which the split applies
    pub envelope: Envelope,

    /// Signed amount of the split
    pub amount: Money,

    /// Split memo
    pub memo: String,
}

impl EnvelopeTransaction {
    pub fn new(envelope: Envelope, amount: Money) -> Self {
        Self {
            id: 0,
            transaction_id: 0,
            envelope,
            amount,
            memo: String::new(),
        }
    }
}
