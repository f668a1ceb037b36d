//! Transaction-related types
//!
//! This module defines peer-to-peer transactions, their lifecycle status and
//! the settlement outcomes accepted by the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::EscrowError;
use super::wallet::UserId;

/// Transaction identifier
pub type TransactionId = Uuid;

/// Lifecycle status of a transaction
///
/// ```text
/// pending --settle(success)--> success
/// pending --settle(fail)-----> fail
/// ```
///
/// `Success` and `Fail` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Created, awaiting settlement
    Pending,

    /// Settled and funds moved
    Success,

    /// Settled without moving funds
    Fail,
}

impl TransactionStatus {
    /// Whether no further transition is permitted
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Settlement outcome requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Fail,
}

impl Outcome {
    /// The terminal status this outcome settles into
    pub fn status(self) -> TransactionStatus {
        match self {
            Outcome::Success => TransactionStatus::Success,
            Outcome::Fail => TransactionStatus::Fail,
        }
    }
}

impl FromStr for Outcome {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "fail" => Ok(Outcome::Fail),
            _ => Err(EscrowError::invalid_outcome(s)),
        }
    }
}

/// A peer-to-peer fund movement request
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// The transaction ID
    pub id: TransactionId,

    /// Client-supplied idempotency token, unique per sender
    pub token: String,

    /// Paying user
    pub from: UserId,

    /// Receiving user, never equal to `from`
    pub to: UserId,

    /// Amount to move, strictly positive
    pub amount: Decimal,

    /// Current lifecycle status
    pub status: TransactionStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Ledger-wide insertion sequence, breaks ties between equal timestamps
    pub seq: u64,

    /// When the transaction reached a terminal status
    pub settled_at: Option<DateTime<Utc>>,
}
