//! Core business logic module
//!
//! This module contains the escrow and ledger components:
//! - `traits` - Collaborator abstractions (identity, social graph, events, notifications)
//! - `wallet_store` - Spendable balances with conditional debit
//! - `budget_store` - Funds locked against a purpose
//! - `ledger` - Peer-to-peer transfer requests and their settlement
//! - `coordinator` - Multi-store workflows (accept invite, settle transaction)
//! - `retry` - Bounded retry of collaborator calls
//! - `pin` - PIN validation and hashing
//! - `directory` - In-memory collaborator implementation

pub mod budget_store;
pub mod coordinator;
pub mod directory;
pub mod ledger;
pub mod pin;
pub mod retry;
pub mod traits;
pub mod wallet_store;

pub use budget_store::BudgetStore;
pub use coordinator::{Collaborators, CoordinatorConfig, EscrowCoordinator};
pub use directory::{EventAggregate, InMemoryDirectory, LogNotifier};
pub use ledger::TransactionLedger;
pub use retry::RetryPolicy;
pub use traits::{
    AcceptanceKey, AttendeeStatus, EventDirectory, Identity, IdentityVerifier, Notifier,
    SocialGraph,
};
pub use wallet_store::WalletStore;
