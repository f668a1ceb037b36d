//! Thread-safe wallet storage
//!
//! This module provides the `WalletStore` struct, which owns every user's
//! spendable balance and PIN hash.
//!
//! # Design
//!
//! Wallets live in a `DashMap` keyed by user ID. Each balance mutation runs
//! while holding the wallet's entry lock, so the check `balance >= amount` and
//! the write happen as one conditional update. Concurrent debits and credits
//! on the same wallet serialize, and the balance is non-negative in every
//! intermediate state, not only the final one.
//!
//! No caller ever reads a balance, computes a new value and writes it back:
//! the only ways to change a balance are [`WalletStore::debit`] and
//! [`WalletStore::credit`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::pin;
use super::traits::Identity;
use crate::types::{EscrowError, UserId, Wallet, WalletId};

/// Reject zero and negative amounts
pub(crate) fn ensure_positive(amount: Decimal) -> Result<(), EscrowError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(EscrowError::precheck_failed(format!(
            "amount must be positive, got {}",
            amount
        )))
    }
}

/// Wallet store, one wallet per user
#[derive(Debug, Default)]
pub struct WalletStore {
    /// Wallets by owning user
    wallets: DashMap<UserId, Wallet>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
        }
    }

    /// Open a wallet for a verified user
    ///
    /// # Returns
    ///
    /// * `Ok(WalletId)` - The new wallet
    /// * `Err(EscrowError::PrecheckFailed)` - KYC is not verified or the PIN is malformed
    /// * `Err(EscrowError::AlreadyExists)` - The user already has a wallet
    pub fn create(&self, identity: &Identity, pin: &str) -> Result<WalletId, EscrowError> {
        if !identity.kyc_verified {
            return Err(EscrowError::precheck_failed(format!(
                "identity of user {} is not verified",
                identity.user
            )));
        }
        let pin = pin::hash(pin)?;

        match self.wallets.entry(identity.user.clone()) {
            Entry::Occupied(_) => {
                Err(EscrowError::already_exists("wallet", &identity.user))
            }
            Entry::Vacant(entry) => {
                let wallet = Wallet::new(identity.user.clone(), pin);
                let id = wallet.id;
                entry.insert(wallet);
                info!(user = %identity.user, wallet = %id, "wallet created");
                Ok(id)
            }
        }
    }

    /// Current spendable balance
    pub fn get_balance(&self, user: &str) -> Result<Decimal, EscrowError> {
        self.wallets
            .get(user)
            .map(|wallet| wallet.balance)
            .ok_or_else(|| EscrowError::wallet_not_found(user))
    }

    pub fn exists(&self, user: &str) -> bool {
        self.wallets.contains_key(user)
    }

    /// Decrement a balance if and only if it covers `amount`
    ///
    /// The precondition is evaluated under the wallet's entry lock, so two
    /// concurrent debits can never both pass against the same funds.
    pub fn debit(&self, user: &str, amount: Decimal) -> Result<(), EscrowError> {
        ensure_positive(amount)?;

        let mut wallet = self
            .wallets
            .get_mut(user)
            .ok_or_else(|| EscrowError::wallet_not_found(user))?;

        if wallet.balance < amount {
            return Err(EscrowError::insufficient_funds(
                user,
                wallet.balance,
                amount,
            ));
        }
        wallet.balance -= amount;

        debug!(user, %amount, balance = %wallet.balance, "wallet debited");
        Ok(())
    }

    /// Increment a balance
    pub fn credit(&self, user: &str, amount: Decimal) -> Result<(), EscrowError> {
        ensure_positive(amount)?;

        let mut wallet = self
            .wallets
            .get_mut(user)
            .ok_or_else(|| EscrowError::wallet_not_found(user))?;

        wallet.balance = wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| EscrowError::precheck_failed("credit would overflow the balance"))?;

        debug!(user, %amount, balance = %wallet.balance, "wallet credited");
        Ok(())
    }

    /// Check a PIN against the stored hash
    pub fn verify_pin(&self, user: &str, pin: &str) -> Result<(), EscrowError> {
        let wallet = self
            .wallets
            .get(user)
            .ok_or_else(|| EscrowError::wallet_not_found(user))?;

        if pin::verify(pin, &wallet.pin) {
            Ok(())
        } else {
            Err(EscrowError::auth_failed(user))
        }
    }

    /// Replace the PIN after verifying the old one
    pub fn change_pin(&self, user: &str, old_pin: &str, new_pin: &str) -> Result<(), EscrowError> {
        let mut wallet = self
            .wallets
            .get_mut(user)
            .ok_or_else(|| EscrowError::wallet_not_found(user))?;

        if !pin::verify(old_pin, &wallet.pin) {
            return Err(EscrowError::auth_failed(user));
        }
        wallet.pin = pin::hash(new_pin)?;

        info!(user, "wallet PIN changed");
        Ok(())
    }

    /// Snapshot of every wallet, in arbitrary order
    pub fn all(&self) -> Vec<Wallet> {
        self.wallets
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
