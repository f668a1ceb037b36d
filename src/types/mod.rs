//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `wallet`: Wallet records and PIN hashes
//! - `budget`: Escrow (budget) records
//! - `transaction`: Peer-to-peer transactions, their status and identifiers
//! - `error`: Error taxonomy for the escrow subsystem

pub mod budget;
pub mod error;
pub mod transaction;
pub mod wallet;

pub use budget::{Budget, BudgetId, PurposeId};
pub use error::{ErrorKind, EscrowError, StepFailure, WorkflowStep};
pub use transaction::{Outcome, Transaction, TransactionId, TransactionStatus};
pub use wallet::{PinHash, UserId, Wallet, WalletId};
