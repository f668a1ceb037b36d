//! Thread-safe escrow (budget) storage
//!
//! A budget holds funds taken out of a wallet against a purpose. `lock` is a
//! single logical operation: it debits the wallet first and only then persists
//! the budget. If the budget cannot be persisted the debit is compensated by a
//! credit, so a wallet is never debited without a matching budget.
//!
//! `release` only removes the record and hands back the amount. Whether the
//! funds go back to the owner or on to a payee is decided by the caller.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::wallet_store::{ensure_positive, WalletStore};
use crate::types::{Budget, BudgetId, EscrowError, PurposeId, UserId};

type BudgetKey = (UserId, PurposeId);

fn key(user: &str, purpose: &str) -> BudgetKey {
    (user.to_string(), purpose.to_string())
}

/// Budget store keyed by (user, purpose)
#[derive(Debug)]
pub struct BudgetStore {
    /// Wallets debited on lock and credited on compensation
    wallets: Arc<WalletStore>,

    /// Active budgets, at most one per (user, purpose)
    budgets: DashMap<BudgetKey, Budget>,

    /// Secondary index from budget ID to its key
    by_id: DashMap<BudgetId, BudgetKey>,
}

impl BudgetStore {
    pub fn new(wallets: Arc<WalletStore>) -> Self {
        Self {
            wallets,
            budgets: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    /// Lock `amount` out of the user's wallet against `purpose`
    ///
    /// Repeating a lock for the same (user, purpose) and the same amount
    /// returns the existing budget without debiting again.
    ///
    /// # Returns
    ///
    /// * `Ok(BudgetId)` - The new or already existing budget
    /// * `Err(EscrowError::InsufficientFunds)` - The wallet does not cover `amount`
    /// * `Err(EscrowError::AlreadyExists)` - A lock with a different amount is active
    pub fn lock(&self, user: &str, purpose: &str, amount: Decimal) -> Result<BudgetId, EscrowError> {
        ensure_positive(amount)?;
        let key = key(user, purpose);

        if let Some(existing) = self.budgets.get(&key) {
            if existing.amount != amount {
                return Err(EscrowError::already_exists(
                    "budget",
                    format!("{}/{}", user, purpose),
                ));
            }
            debug!(user, purpose, budget = %existing.id, "lock already held");
            return Ok(existing.id);
        }

        self.wallets.debit(user, amount)?;

        match self.budgets.entry(key.clone()) {
            Entry::Vacant(entry) => {
                let budget = Budget::new(key.0.clone(), key.1.clone(), amount);
                let id = budget.id;
                self.by_id.insert(id, key);
                entry.insert(budget);
                info!(user, purpose, %amount, budget = %id, "funds locked");
                Ok(id)
            }
            Entry::Occupied(entry) => {
                // Lost the race to a concurrent lock of the same key
                let existing = entry.get().clone();
                drop(entry);
                self.compensate(user, amount);

                if existing.amount == amount {
                    Ok(existing.id)
                } else {
                    Err(EscrowError::already_exists(
                        "budget",
                        format!("{}/{}", user, purpose),
                    ))
                }
            }
        }
    }

    fn compensate(&self, user: &str, amount: Decimal) {
        match self.wallets.credit(user, amount) {
            Ok(()) => debug!(user, %amount, "lock debit compensated"),
            Err(e) => error!(user, %amount, error = %e, "failed to compensate lock debit"),
        }
    }

    /// Delete a budget and return its amount
    ///
    /// No wallet is touched. Releasing the same budget twice fails with
    /// `NotFound`. The record is removed before its index entry, so a lock
    /// that still finds the record always finds a live budget.
    pub fn release(&self, id: BudgetId) -> Result<Decimal, EscrowError> {
        let key = self
            .by_id
            .get(&id)
            .map(|key| key.value().clone())
            .ok_or_else(|| EscrowError::budget_not_found(id))?;

        let (_, budget) = self
            .budgets
            .remove_if(&key, |_, budget| budget.id == id)
            .ok_or_else(|| EscrowError::budget_not_found(id))?;
        self.by_id.remove(&id);

        info!(user = %budget.user, purpose = %budget.purpose, amount = %budget.amount, budget = %id, "budget released");
        Ok(budget.amount)
    }

    /// Put a released budget back, used when its disposition could not complete
    pub(crate) fn restore(&self, budget: Budget) -> Result<(), EscrowError> {
        let key = key(&budget.user, &budget.purpose);
        match self.budgets.entry(key.clone()) {
            Entry::Occupied(_) => Err(EscrowError::already_exists(
                "budget",
                format!("{}/{}", key.0, key.1),
            )),
            Entry::Vacant(entry) => {
                self.by_id.insert(budget.id, key);
                info!(budget = %budget.id, "budget restored");
                entry.insert(budget);
                Ok(())
            }
        }
    }

    pub fn get(&self, user: &str, purpose: &str) -> Result<Budget, EscrowError> {
        self.budgets
            .get(&key(user, purpose))
            .map(|budget| budget.value().clone())
            .ok_or_else(|| EscrowError::budget_not_found(format!("{}/{}", user, purpose)))
    }

    /// All active budgets of a user
    pub fn active_for_user(&self, user: &str) -> Vec<Budget> {
        self.budgets
            .iter()
            .filter(|entry| entry.key().0 == user)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Sum of a user's active budgets
    pub fn locked_total(&self, user: &str) -> Decimal {
        self.active_for_user(user)
            .iter()
            .map(|budget| budget.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Identity;
    use crate::types::ErrorKind;
    use proptest::prelude::*;
    use std::thread;

    fn setup(balance: i64) -> (Arc<WalletStore>, BudgetStore) {
        let wallets = Arc::new(WalletStore::new());
        wallets
            .create(
                &Identity {
                    user: "alice".to_string(),
                    kyc_verified: true,
                },
                "1234",
            )
            .unwrap();
        if balance > 0 {
            wallets.credit("alice", Decimal::from(balance)).unwrap();
        }
        let budgets = BudgetStore::new(Arc::clone(&wallets));
        (wallets, budgets)
    }

    #[test]
    fn test_lock_moves_funds_into_budget() {
        let (wallets, budgets) = setup(10000);

        let id = budgets.lock("alice", "event-1", Decimal::from(3000)).unwrap();

        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(7000));
        let budget = budgets.get("alice", "event-1").unwrap();
        assert_eq!(budget.id, id);
        assert_eq!(budget.amount, Decimal::from(3000));
        assert_eq!(budgets.active_for_user("alice").len(), 1);
    }

    #[test]
    fn test_lock_insufficient_funds_creates_nothing() {
        let (wallets, budgets) = setup(100);

        let err = budgets
            .lock("alice", "event-1", Decimal::from(500))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(100));
        assert_eq!(
            budgets.get("alice", "event-1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_lock_without_wallet() {
        let (_, budgets) = setup(0);

        let err = budgets.lock("bob", "event-1", Decimal::ONE).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(budgets.active_for_user("bob").is_empty());
    }

    #[test]
    fn test_repeated_lock_same_amount_is_idempotent() {
        let (wallets, budgets) = setup(1000);

        let first = budgets.lock("alice", "event-1", Decimal::from(300)).unwrap();
        let second = budgets.lock("alice", "event-1", Decimal::from(300)).unwrap();

        assert_eq!(first, second);
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(700));
    }

    #[test]
    fn test_lock_different_amount_keeps_existing_budget() {
        let (wallets, budgets) = setup(1000);
        budgets.lock("alice", "event-1", Decimal::from(300)).unwrap();

        let err = budgets
            .lock("alice", "event-1", Decimal::from(200))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(700));
        assert_eq!(
            budgets.get("alice", "event-1").unwrap().amount,
            Decimal::from(300)
        );
    }

    #[test]
    fn test_lock_different_amount_rejected_before_debit() {
        let (wallets, budgets) = setup(100);
        budgets.lock("alice", "event-1", Decimal::from(50)).unwrap();

        let err = budgets
            .lock("alice", "event-1", Decimal::from(80))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(50));
        assert_eq!(budgets.locked_total("alice"), Decimal::from(50));
    }

    #[test]
    fn test_release_returns_amount_without_touching_wallet() {
        let (wallets, budgets) = setup(1000);
        let id = budgets.lock("alice", "event-1", Decimal::from(250)).unwrap();

        let amount = budgets.release(id).unwrap();

        assert_eq!(amount, Decimal::from(250));
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(750));
        assert!(budgets.active_for_user("alice").is_empty());
    }

    #[test]
    fn test_release_twice_fails() {
        let (_, budgets) = setup(1000);
        let id = budgets.lock("alice", "event-1", Decimal::from(250)).unwrap();
        budgets.release(id).unwrap();

        let err = budgets.release(id).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_restore_after_release() {
        let (_, budgets) = setup(1000);
        let id = budgets.lock("alice", "event-1", Decimal::from(250)).unwrap();
        let budget = budgets.get("alice", "event-1").unwrap();
        budgets.release(id).unwrap();

        budgets.restore(budget).unwrap();

        assert_eq!(budgets.release(id).unwrap(), Decimal::from(250));
    }

    #[test]
    fn test_locked_total_sums_active_budgets() {
        let (_, budgets) = setup(1000);
        budgets.lock("alice", "event-1", Decimal::from(100)).unwrap();
        budgets.lock("alice", "event-2", Decimal::from(150)).unwrap();

        assert_eq!(budgets.locked_total("alice"), Decimal::from(250));
        assert_eq!(budgets.locked_total("bob"), Decimal::ZERO);
    }

    #[test]
    fn test_concurrent_identical_locks_debit_once() {
        let (wallets, budgets) = setup(1000);
        let budgets = Arc::new(budgets);
        let mut handles = vec![];

        for _ in 0..8 {
            let budgets = Arc::clone(&budgets);
            handles.push(thread::spawn(move || {
                budgets.lock("alice", "event-1", Decimal::from(400)).unwrap()
            }));
        }

        let ids: Vec<BudgetId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(600));
        assert_eq!(budgets.locked_total("alice"), Decimal::from(400));
    }

    #[test]
    fn test_relock_after_release_gets_fresh_budget() {
        let (wallets, budgets) = setup(1000);
        let first = budgets.lock("alice", "event-1", Decimal::from(100)).unwrap();
        budgets.release(first).unwrap();

        let second = budgets.lock("alice", "event-1", Decimal::from(100)).unwrap();

        assert_ne!(first, second);
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(800));
        assert_eq!(
            budgets.release(first).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(budgets.release(second).unwrap(), Decimal::from(100));
    }

    #[test]
    fn test_concurrent_lock_and_release_keep_index_consistent() {
        let (wallets, budgets) = setup(1000);
        let budgets = Arc::new(budgets);
        let mut handles = vec![];

        for _ in 0..8 {
            let wallets = Arc::clone(&wallets);
            let budgets = Arc::clone(&budgets);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    if let Ok(id) = budgets.lock("alice", "event-1", Decimal::from(10)) {
                        if let Ok(amount) = budgets.release(id) {
                            wallets.credit("alice", amount).unwrap();
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let active = budgets.active_for_user("alice");
        assert!(active.len() <= 1);
        assert_eq!(
            wallets.get_balance("alice").unwrap() + budgets.locked_total("alice"),
            Decimal::from(1000)
        );
        // every surviving record is still reachable through its id
        for budget in active {
            assert_eq!(budgets.release(budget.id).unwrap(), Decimal::from(10));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// wallet balance + locked funds stays equal to everything credited
        #[test]
        fn prop_lock_release_conserves_funds(
            initial in 0u32..5000,
            amounts in prop::collection::vec(1u32..2000, 1..10),
        ) {
            let (wallets, budgets) = setup(i64::from(initial));
            let total = Decimal::from(initial);
            let mut ids = Vec::new();

            for (i, amount) in amounts.iter().enumerate() {
                if let Ok(id) = budgets.lock("alice", &format!("event-{}", i), Decimal::from(*amount)) {
                    ids.push(id);
                }
                prop_assert_eq!(
                    wallets.get_balance("alice").unwrap() + budgets.locked_total("alice"),
                    total
                );
            }

            for id in ids {
                let amount = budgets.release(id).unwrap();
                wallets.credit("alice", amount).unwrap();
                prop_assert_eq!(
                    wallets.get_balance("alice").unwrap() + budgets.locked_total("alice"),
                    total
                );
            }

            prop_assert_eq!(wallets.get_balance("alice").unwrap(), total);
        }
    }
}
