//! Thread-safe transaction ledger
//!
//! The ledger records peer-to-peer transfer requests and their lifecycle.
//! It never mutates wallet balances itself: settlement takes an effect closure
//! supplied by the caller, which moves the money.
//!
//! # Design
//!
//! Transactions live in a `DashMap` keyed by transaction ID, with a secondary
//! unique index on (sender, idempotency token). Settlement runs the effect while
//! holding the transaction's entry lock, so no reader can observe `success`
//! before the effect has committed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::SocialGraph;
use super::wallet_store::{ensure_positive, WalletStore};
use crate::types::{
    EscrowError, Outcome, Transaction, TransactionId, TransactionStatus, UserId,
};

/// Transaction ledger
pub struct TransactionLedger {
    /// Wallets, read for the advisory funds check at creation
    wallets: Arc<WalletStore>,

    /// Friendship checks
    social: Arc<dyn SocialGraph>,

    transactions: DashMap<TransactionId, Transaction>,

    /// (sender, idempotency token) -> transaction
    tokens: DashMap<(UserId, String), TransactionId>,

    seq: AtomicU64,
}

impl std::fmt::Debug for TransactionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLedger")
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl TransactionLedger {
    pub fn new(wallets: Arc<WalletStore>, social: Arc<dyn SocialGraph>) -> Self {
        Self {
            wallets,
            social,
            transactions: DashMap::new(),
            tokens: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Record a new pending transaction
    ///
    /// The funds check is advisory: nothing is reserved, and settlement checks
    /// again when it debits. A repeated call with the same sender and token
    /// returns the original record.
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - The new or previously recorded transaction
    /// * `Err(EscrowError::SelfTransfer)` - `from == to`
    /// * `Err(EscrowError::NotFriends)` - The users are not connected
    /// * `Err(EscrowError::InsufficientFunds)` - The sender's balance is below `amount`
    /// * `Err(EscrowError::NotFound)` - Either party has no wallet
    pub async fn create(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        token: &str,
    ) -> Result<Transaction, EscrowError> {
        ensure_positive(amount)?;
        if from == to {
            return Err(EscrowError::self_transfer(from));
        }

        let token_key = (from.to_string(), token.to_string());
        let existing = self.tokens.get(&token_key).map(|id| *id.value());
        if let Some(id) = existing {
            debug!(from, token, tx = %id, "idempotent replay of transaction");
            return self.get(id);
        }

        if !self.social.are_friends(from, to).await? {
            return Err(EscrowError::not_friends(from, to));
        }

        let available = self.wallets.get_balance(from)?;
        if available < amount {
            return Err(EscrowError::insufficient_funds(from, available, amount));
        }
        if !self.wallets.exists(to) {
            return Err(EscrowError::wallet_not_found(to));
        }

        match self.tokens.entry(token_key) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                drop(entry);
                self.get(id)
            }
            Entry::Vacant(entry) => {
                let transaction = Transaction {
                    id: Uuid::new_v4(),
                    token: token.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                    amount,
                    status: TransactionStatus::Pending,
                    created_at: chrono::Utc::now(),
                    seq: self.seq.fetch_add(1, Ordering::SeqCst),
                    settled_at: None,
                };
                self.transactions
                    .insert(transaction.id, transaction.clone());
                entry.insert(transaction.id);

                info!(tx = %transaction.id, from, to, %amount, "transaction created");
                Ok(transaction)
            }
        }
    }

    pub fn get(&self, id: TransactionId) -> Result<Transaction, EscrowError> {
        self.transactions
            .get(&id)
            .map(|tx| tx.value().clone())
            .ok_or_else(|| EscrowError::transaction_not_found(id))
    }

    /// Look a transaction up by its sender and idempotency token
    pub fn find_by_token(&self, from: &str, token: &str) -> Result<Transaction, EscrowError> {
        let id = self
            .tokens
            .get(&(from.to_string(), token.to_string()))
            .map(|id| *id.value())
            .ok_or_else(|| EscrowError::transaction_not_found(format!("{}/{}", from, token)))?;
        self.get(id)
    }

    /// Settle a pending transaction without any side effect
    ///
    /// `outcome` must be `success` or `fail`.
    pub fn settle(&self, id: TransactionId, outcome: &str) -> Result<Transaction, EscrowError> {
        let outcome: Outcome = outcome.parse()?;
        self.settle_with(id, outcome, |_| Ok(()))
    }

    /// Settle a pending transaction, running `effect` for a `success` outcome
    ///
    /// `effect` runs under the transaction's entry lock. If it fails the
    /// transaction becomes `fail` and `SettlementFailed` is returned, so a
    /// `success` status always means the effect committed.
    pub fn settle_with<F>(
        &self,
        id: TransactionId,
        outcome: Outcome,
        effect: F,
    ) -> Result<Transaction, EscrowError>
    where
        F: FnOnce(&Transaction) -> Result<(), EscrowError>,
    {
        let mut tx = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| EscrowError::transaction_not_found(id))?;

        if tx.status.is_terminal() {
            return Err(EscrowError::invalid_transition(id, tx.status));
        }

        if outcome == Outcome::Success {
            if let Err(e) = effect(&*tx) {
                tx.status = TransactionStatus::Fail;
                tx.settled_at = Some(chrono::Utc::now());
                warn!(tx = %id, error = %e, "settlement effect failed, transaction marked fail");
                return Err(EscrowError::settlement_failed(id, e));
            }
        }

        let status = outcome.status();

        tx.status = status;
        tx.settled_at = Some(chrono::Utc::now());
        info!(tx = %id, %status, "transaction settled");
        Ok(tx.value().clone())
    }

    /// Transactions sent or received by `user`, newest first
    pub fn list_for_user(&self, user: &str) -> Vec<Transaction> {
        let mut list: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| entry.from == user || entry.to == user)
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
        list
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
