//! Budget (escrow) types
//!
//! A budget is an amount removed from a wallet's spendable balance and held
//! against a purpose until it is released.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::wallet::UserId;

/// Identifier of the thing funds are locked against (e.g. an event)
pub type PurposeId = String;

/// Budget identifier
pub type BudgetId = Uuid;

/// Funds locked out of a wallet for a specific purpose
///
/// At most one active budget exists per (user, purpose) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    /// The budget ID
    pub id: BudgetId,

    /// User whose wallet was debited
    pub user: UserId,

    /// Purpose the funds are held against
    pub purpose: PurposeId,

    /// Locked amount, strictly positive
    pub amount: Decimal,

    /// When the lock was taken
    pub created_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(user: UserId, purpose: PurposeId, amount: Decimal) -> Self {
        Budget {
            id: Uuid::new_v4(),
            user,
            purpose,
            amount,
            created_at: Utc::now(),
        }
    }
}
