//! Error types for the escrow subsystem
//!
//! Every failure carries a taxonomy kind (see [`ErrorKind`]) and a
//! human-readable message.
//!
//! # Error Categories
//!
//! - **Business-rule violations**: not found, insufficient funds, bad PIN,
//!   self transfer, non-friends, invalid transitions. Definite, never retried.
//! - **Workflow failures**: partial failure of a fanned-out workflow, failed
//!   settlement.
//! - **Infrastructure errors**: transient collaborator unavailability, retried
//!   with bounded attempts and surfaced as `Timeout`.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use super::transaction::{TransactionId, TransactionStatus};

/// Taxonomy kind of an [`EscrowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InsufficientFunds,
    AuthFailed,
    SelfTransfer,
    NotFriends,
    InvalidTransition,
    InvalidOutcome,
    SettlementFailed,
    PartialFailure,
    PrecheckFailed,
    Timeout,
    /// Transient infrastructure error; coordinator operations never return it
    Unavailable,
}

/// A sub-operation of the accept-invite workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStep {
    /// Attendee record moved to `attending`
    MarkAttending,
    /// Event aggregate counters updated
    RecordAttendance,
    /// Wallet funds locked into a budget
    LockFunds,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStep::MarkAttending => "mark attending",
            WorkflowStep::RecordAttendance => "record attendance",
            WorkflowStep::LockFunds => "lock funds",
        };
        f.write_str(s)
    }
}

/// A failed step of a fanned-out workflow
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: WorkflowStep,
    pub error: EscrowError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

fn join_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for the escrow subsystem
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EscrowError {
    /// A wallet, budget or transaction does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record looked up
        entity: &'static str,
        /// Key that was looked up
        key: String,
    },

    /// A record with the same identity already exists
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// The wallet balance does not cover the requested amount
    ///
    /// The wallet state remains unchanged.
    #[error("Insufficient funds for user {user}: available {available}, requested {requested}")]
    InsufficientFunds {
        user: String,
        available: Decimal,
        requested: Decimal,
    },

    /// The supplied PIN does not match the stored hash
    #[error("PIN verification failed for user {user}")]
    AuthFailed { user: String },

    #[error("User {user} cannot transfer funds to themselves")]
    SelfTransfer { user: String },

    #[error("Users {from} and {to} are not friends")]
    NotFriends { from: String, to: String },

    /// The transaction is already terminal
    #[error("Transaction {tx} is {status} and cannot be settled again")]
    InvalidTransition {
        tx: TransactionId,
        status: TransactionStatus,
    },

    #[error("Invalid settlement outcome '{outcome}'")]
    InvalidOutcome { outcome: String },

    /// A `success` settlement could not move the funds; the transaction is `fail`
    #[error("Settlement of transaction {tx} failed: {reason}")]
    SettlementFailed { tx: TransactionId, reason: String },

    /// One or more fanned-out sub-operations failed
    ///
    /// The records touched by the workflow may be inconsistent until the
    /// caller retries with the same idempotency key.
    #[error("{operation} partially failed: {}", join_failures(failures))]
    PartialFailure {
        operation: String,
        failures: Vec<StepFailure>,
    },

    /// An eligibility check (KYC, PIN format, amount, invite status) failed
    #[error("Precheck failed: {reason}")]
    PrecheckFailed { reason: String },

    /// The operation did not finish in time; its outcome is unknown
    #[error("{operation} timed out; outcome unknown, re-read state to reconcile")]
    Timeout { operation: String },

    /// Transient collaborator failure
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },
}

impl EscrowError {
    /// The taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EscrowError::NotFound { .. } => ErrorKind::NotFound,
            EscrowError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            EscrowError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            EscrowError::AuthFailed { .. } => ErrorKind::AuthFailed,
            EscrowError::SelfTransfer { .. } => ErrorKind::SelfTransfer,
            EscrowError::NotFriends { .. } => ErrorKind::NotFriends,
            EscrowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            EscrowError::InvalidOutcome { .. } => ErrorKind::InvalidOutcome,
            EscrowError::SettlementFailed { .. } => ErrorKind::SettlementFailed,
            EscrowError::PartialFailure { .. } => ErrorKind::PartialFailure,
            EscrowError::PrecheckFailed { .. } => ErrorKind::PrecheckFailed,
            EscrowError::Timeout { .. } => ErrorKind::Timeout,
            EscrowError::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EscrowError::Unavailable { .. })
    }
}

// Helper functions for creating common errors

impl EscrowError {
    pub fn wallet_not_found(user: &str) -> Self {
        EscrowError::NotFound {
            entity: "wallet",
            key: user.to_string(),
        }
    }

    pub fn budget_not_found(key: impl fmt::Display) -> Self {
        EscrowError::NotFound {
            entity: "budget",
            key: key.to_string(),
        }
    }

    pub fn transaction_not_found(key: impl fmt::Display) -> Self {
        EscrowError::NotFound {
            entity: "transaction",
            key: key.to_string(),
        }
    }

    pub fn already_exists(entity: &'static str, key: impl fmt::Display) -> Self {
        EscrowError::AlreadyExists {
            entity,
            key: key.to_string(),
        }
    }

    pub fn insufficient_funds(user: &str, available: Decimal, requested: Decimal) -> Self {
        EscrowError::InsufficientFunds {
            user: user.to_string(),
            available,
            requested,
        }
    }

    pub fn auth_failed(user: &str) -> Self {
        EscrowError::AuthFailed {
            user: user.to_string(),
        }
    }

    pub fn self_transfer(user: &str) -> Self {
        EscrowError::SelfTransfer {
            user: user.to_string(),
        }
    }

    pub fn not_friends(from: &str, to: &str) -> Self {
        EscrowError::NotFriends {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_transition(tx: TransactionId, status: TransactionStatus) -> Self {
        EscrowError::InvalidTransition { tx, status }
    }

    pub fn invalid_outcome(outcome: &str) -> Self {
        EscrowError::InvalidOutcome {
            outcome: outcome.to_string(),
        }
    }

    pub fn settlement_failed(tx: TransactionId, reason: impl fmt::Display) -> Self {
        EscrowError::SettlementFailed {
            tx,
            reason: reason.to_string(),
        }
    }

    pub fn precheck_failed(reason: impl Into<String>) -> Self {
        EscrowError::PrecheckFailed {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: &str) -> Self {
        EscrowError::Timeout {
            operation: operation.to_string(),
        }
    }

    pub fn unavailable(service: &str, message: impl Into<String>) -> Self {
        EscrowError::Unavailable {
            service: service.to_string(),
            message: message.into(),
        }
    }
}
