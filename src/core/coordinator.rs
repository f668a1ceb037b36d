//! Escrow workflow orchestration
//!
//! This module provides the `EscrowCoordinator`, which sequences operations
//! across the wallet store, budget store and transaction ledger.
//!
//! # Architecture
//!
//! ```text
//! EscrowCoordinator
//!     ├── Arc<WalletStore>        (spendable balances)
//!     ├── Arc<BudgetStore>        (locked funds)
//!     ├── Arc<TransactionLedger>  (transfer requests)
//!     └── Collaborators           (identity, events, notifications)
//! ```
//!
//! # Workflows
//!
//! - **Accept invite**: marks the attendee, updates the event aggregate and
//!   locks the budget concurrently, then joins all three. Any failed branch is
//!   reported as `PartialFailure`; the others are not rolled back. Every branch
//!   is conditional on (event, user), so retrying converges.
//! - **Settle transaction**: sequential. A `success` settlement debits the
//!   sender and credits the receiver under the transaction's lock. If the debit
//!   fails the transaction ends up `fail` and `SettlementFailed` is returned.
//!
//! Every public operation is bounded by the configured timeout. A timeout means
//! the outcome is unknown; in-flight store calls are abandoned, not rolled back.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::budget_store::BudgetStore;
use super::ledger::TransactionLedger;
use super::retry::RetryPolicy;
use super::traits::{
    AcceptanceKey, AttendeeStatus, EventDirectory, IdentityVerifier, Notifier, SocialGraph,
};
use super::wallet_store::{ensure_positive, WalletStore};
use crate::types::{
    BudgetId, EscrowError, Outcome, StepFailure, Transaction, TransactionId, WalletId,
    WorkflowStep,
};

/// Coordinator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Upper bound on every public operation
    pub timeout: Duration,

    /// Retry policy for collaborator calls
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// External services the coordinator depends on
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityVerifier>,
    pub social: Arc<dyn SocialGraph>,
    pub events: Arc<dyn EventDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

/// Orchestrates the escrow workflows
#[derive(Clone)]
pub struct EscrowCoordinator {
    wallets: Arc<WalletStore>,
    budgets: Arc<BudgetStore>,
    ledger: Arc<TransactionLedger>,
    identity: Arc<dyn IdentityVerifier>,
    events: Arc<dyn EventDirectory>,
    notifier: Arc<dyn Notifier>,

    /// Funding references already credited, with the user they credited
    funding: Arc<DashMap<String, String>>,

    config: CoordinatorConfig,
}

impl std::fmt::Debug for EscrowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EscrowCoordinator {
    /// Build a coordinator with fresh in-memory stores
    pub fn new(collaborators: Collaborators, config: CoordinatorConfig) -> Self {
        let wallets = Arc::new(WalletStore::new());
        let budgets = Arc::new(BudgetStore::new(Arc::clone(&wallets)));
        let ledger = Arc::new(TransactionLedger::new(
            Arc::clone(&wallets),
            Arc::clone(&collaborators.social),
        ));
        Self::with_stores(wallets, budgets, ledger, collaborators, config)
    }

    /// Build a coordinator over existing stores
    pub fn with_stores(
        wallets: Arc<WalletStore>,
        budgets: Arc<BudgetStore>,
        ledger: Arc<TransactionLedger>,
        collaborators: Collaborators,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            wallets,
            budgets,
            ledger,
            identity: collaborators.identity,
            events: collaborators.events,
            notifier: collaborators.notifier,
            funding: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn wallets(&self) -> &Arc<WalletStore> {
        &self.wallets
    }

    pub fn budgets(&self) -> &Arc<BudgetStore> {
        &self.budgets
    }

    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    async fn bounded<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T, EscrowError>
    where
        Fut: Future<Output = Result<T, EscrowError>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "operation failed");
                Err(e)
            }
            Err(_) => {
                warn!(operation, timeout = ?self.config.timeout, "operation timed out");
                Err(EscrowError::timeout(operation))
            }
        }
    }

    /// Send a notification without waiting for delivery
    fn notify(&self, user: &str, message: String) {
        let notifier = Arc::clone(&self.notifier);
        let user = user.to_string();
        tokio::spawn(async move {
            notifier.notify(&user, &message).await;
        });
    }

    /// Open a wallet for the caller identified by `token`
    pub async fn open_wallet(&self, token: &str, pin: &str) -> Result<WalletId, EscrowError> {
        self.bounded("open wallet", async {
            let identity = self
                .config
                .retry
                .run("resolve identity", || self.identity.resolve(token))
                .await?;
            self.wallets.create(&identity, pin)
        })
        .await
    }

    /// Credit an externally verified deposit, once per `reference`
    ///
    /// Returns the wallet balance after the credit. A repeated reference is a
    /// no-op.
    pub async fn confirm_funding(
        &self,
        user: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<Decimal, EscrowError> {
        self.bounded("confirm funding", async {
            match self.funding.entry(reference.to_string()) {
                Entry::Occupied(entry) => {
                    if entry.get() != user {
                        return Err(EscrowError::already_exists("funding reference", reference));
                    }
                    debug!(user, reference, "funding reference already applied");
                }
                Entry::Vacant(entry) => {
                    self.wallets.credit(user, amount)?;
                    entry.insert(user.to_string());
                    info!(user, %amount, reference, "funding confirmed");
                }
            }
            self.wallets.get_balance(user)
        })
        .await
    }

    pub async fn change_pin(
        &self,
        user: &str,
        old_pin: &str,
        new_pin: &str,
    ) -> Result<(), EscrowError> {
        self.bounded("change pin", async {
            self.wallets.change_pin(user, old_pin, new_pin)
        })
        .await
    }

    /// Record a PIN-authorized transfer request
    pub async fn request_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        pin: &str,
        token: &str,
    ) -> Result<Transaction, EscrowError> {
        self.bounded("request transfer", async {
            self.wallets.verify_pin(from, pin)?;
            let transaction = self
                .config
                .retry
                .run("create transaction", || {
                    self.ledger.create(from, to, amount, token)
                })
                .await?;
            self.notify(
                to,
                format!("{} requested to send you {}", from, transaction.amount),
            );
            Ok(transaction)
        })
        .await
    }

    /// Settle a transaction and, on success, move its funds
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - Settled as requested
    /// * `Err(EscrowError::InvalidOutcome)` - `outcome` is not `success` or `fail`
    /// * `Err(EscrowError::InvalidTransition)` - Already settled
    /// * `Err(EscrowError::SettlementFailed)` - Funds could not move; status is now `fail`
    pub async fn settle_transaction(
        &self,
        id: TransactionId,
        outcome: &str,
    ) -> Result<Transaction, EscrowError> {
        self.bounded("settle transaction", async {
            let outcome: Outcome = outcome.parse()?;
            let settled = self
                .ledger
                .settle_with(id, outcome, |tx| self.move_funds(tx))?;

            let message = format!("transaction {} settled as {}", settled.id, settled.status);
            self.notify(&settled.from, message.clone());
            self.notify(&settled.to, message);
            Ok(settled)
        })
        .await
    }

    /// Paired debit/credit for a settled transaction
    fn move_funds(&self, tx: &Transaction) -> Result<(), EscrowError> {
        if !self.wallets.exists(&tx.to) {
            return Err(EscrowError::wallet_not_found(&tx.to));
        }
        self.wallets.debit(&tx.from, tx.amount)?;

        if let Err(e) = self.wallets.credit(&tx.to, tx.amount) {
            // put the sender back as it was
            if let Err(undo) = self.wallets.credit(&tx.from, tx.amount) {
                warn!(tx = %tx.id, error = %undo, "failed to return debited funds");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Accept a priced event invite, locking `amount` from the user's wallet
    ///
    /// # Returns
    ///
    /// * `Ok(BudgetId)` - All three records updated
    /// * `Err(EscrowError::PrecheckFailed)` - The user is not awaiting a reply
    /// * `Err(EscrowError::InsufficientFunds)` - Balance below `amount`; nothing changed
    /// * `Err(EscrowError::PartialFailure)` - Some branches failed; retry to converge
    pub async fn accept_invite(
        &self,
        user: &str,
        event: &str,
        amount: Decimal,
    ) -> Result<BudgetId, EscrowError> {
        self.bounded("accept invite", async {
            ensure_positive(amount)?;

            let status = self
                .config
                .retry
                .run("attendee status", || self.events.attendee_status(event, user))
                .await?;
            match status {
                Some(AttendeeStatus::Invited) => {}
                Some(AttendeeStatus::Attending { budget }) if budget == amount => {
                    debug!(user, event, "resuming earlier acceptance");
                }
                Some(other) => {
                    return Err(EscrowError::precheck_failed(format!(
                        "user {} cannot accept {}: {:?}",
                        user, event, other
                    )))
                }
                None => {
                    return Err(EscrowError::precheck_failed(format!(
                        "user {} is not invited to {}",
                        user, event
                    )))
                }
            }

            let already_locked = self
                .budgets
                .get(user, event)
                .map(|budget| budget.amount == amount)
                .unwrap_or(false);
            if !already_locked {
                let available = self.wallets.get_balance(user)?;
                if available < amount {
                    return Err(EscrowError::insufficient_funds(user, available, amount));
                }
            }

            let key = AcceptanceKey {
                event: event.to_string(),
                user: user.to_string(),
            };
            let retry = self.config.retry;

            let (attending, attendance, locked) = tokio::join!(
                retry.run("mark attending", || self.events.mark_attending(&key, amount)),
                retry.run("record attendance", || {
                    self.events.record_attendance(&key, amount)
                }),
                async { self.budgets.lock(user, event, amount) },
            );

            let mut failures = Vec::new();
            if let Err(error) = attending {
                failures.push(StepFailure {
                    step: WorkflowStep::MarkAttending,
                    error,
                });
            }
            if let Err(error) = attendance {
                failures.push(StepFailure {
                    step: WorkflowStep::RecordAttendance,
                    error,
                });
            }
            let budget_id = match locked {
                Ok(id) => Some(id),
                Err(error) => {
                    failures.push(StepFailure {
                        step: WorkflowStep::LockFunds,
                        error,
                    });
                    None
                }
            };

            match budget_id {
                Some(id) if failures.is_empty() => {
                    info!(user, event, %amount, budget = %id, "invite accepted");
                    self.notify(user, format!("you are attending {}", event));
                    Ok(id)
                }
                _ => Err(EscrowError::PartialFailure {
                    operation: "accept invite".to_string(),
                    failures,
                }),
            }
        })
        .await
    }

    /// Release a budget back to its owner
    ///
    /// Returns the refunded amount.
    pub async fn refund_budget(&self, user: &str, purpose: &str) -> Result<Decimal, EscrowError> {
        self.bounded("refund budget", async {
            let budget = self.budgets.get(user, purpose)?;
            let amount = self.budgets.release(budget.id)?;

            if let Err(e) = self.wallets.credit(user, amount) {
                self.restore(budget);
                return Err(e);
            }
            info!(user, purpose, %amount, "budget refunded");
            Ok(amount)
        })
        .await
    }

    /// Release a budget to `payee`
    ///
    /// Returns the paid amount. If the payee cannot be credited the budget is
    /// put back untouched.
    pub async fn pay_out_budget(
        &self,
        user: &str,
        purpose: &str,
        payee: &str,
    ) -> Result<Decimal, EscrowError> {
        self.bounded("pay out budget", async {
            if !self.wallets.exists(payee) {
                return Err(EscrowError::wallet_not_found(payee));
            }
            let budget = self.budgets.get(user, purpose)?;
            let amount = self.budgets.release(budget.id)?;

            if let Err(e) = self.wallets.credit(payee, amount) {
                self.restore(budget);
                return Err(e);
            }
            info!(user, purpose, payee, %amount, "budget paid out");
            self.notify(payee, format!("you received {} from {}", amount, user));
            Ok(amount)
        })
        .await
    }

    fn restore(&self, budget: crate::types::Budget) {
        let id = budget.id;
        if let Err(e) = self.budgets.restore(budget) {
            warn!(budget = %id, error = %e, "failed to restore released budget");
        }
    }
}
