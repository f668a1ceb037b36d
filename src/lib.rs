//! Escrow & Ledger Library
//! # Overview
//!
//! This library implements the money-handling core of a social event platform:
//! user wallets, funds held in escrow against event invitations, and
//! peer-to-peer transfer requests that are settled later.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Wallet, Budget, Transaction, errors)
//! - [`core`] - Business logic components:
//!   - [`core::wallet_store`] - Spendable balances with conditional debit
//!   - [`core::budget_store`] - Escrowed funds, one lock per (user, purpose)
//!   - [`core::ledger`] - Transfer requests and their one-way status machine
//!   - [`core::coordinator`] - Workflows spanning several stores
//! - [`io`] - Command-script parsing and wallet-state output
//! - [`replay`] - Replays a command script through the coordinator
//! - [`cli`] - CLI arguments parsing
//!
//! # Workflows
//!
//! - **Accept invite**: lock the invite's price from the user's wallet while
//!   marking them attending and updating the event totals
//! - **Settle transaction**: finalize a pending transfer as `success` (moving
//!   funds) or `fail`
//! - **Refund / pay out**: release an escrowed budget to its owner or a payee
//!
//! # Invariants
//!
//! - A wallet balance never goes negative
//! - At most one active budget per (user, purpose)
//! - Total funds (balances plus budgets) only change through funding
//! - Transaction status moves `pending` → `success` | `fail` and never back

pub mod cli;
pub mod core;
pub mod io;
pub mod replay;
pub mod types;

pub use core::{BudgetStore, EscrowCoordinator, TransactionLedger, WalletStore};
pub use io::write_wallets_csv;
pub use replay::{replay_file, ReplayConfig, ReplayError};
pub use types::{
    Budget, BudgetId, ErrorKind, EscrowError, Outcome, Transaction, TransactionId,
    TransactionStatus, UserId, Wallet, WalletId,
};
