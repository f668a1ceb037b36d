//! Wallet-related types
//!
//! A wallet holds a single user's spendable balance. Balances never go
//! negative; every mutation goes through [`crate::core::WalletStore`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// User identifier, resolved by the identity collaborator
pub type UserId = String;

/// Wallet identifier
pub type WalletId = Uuid;

/// Salted hash of a 4-digit transaction PIN
///
/// The raw PIN is never stored. `digest` is `hex(sha256(salt || pin))`.
#[derive(Clone, PartialEq, Eq)]
pub struct PinHash {
    /// Hex-encoded random salt
    pub salt: String,
    /// Hex-encoded SHA-256 digest
    pub digest: String,
}

impl std::fmt::Debug for PinHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PinHash(..)")
    }
}

/// A user's wallet
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    /// The wallet ID
    pub id: WalletId,

    /// Owning user (one wallet per user)
    pub user: UserId,

    /// Spendable balance, always `>= 0`
    pub balance: Decimal,

    /// Hash of the authorization PIN
    pub pin: PinHash,

    /// When the wallet was opened
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new wallet with a zero balance
    pub fn new(user: UserId, pin: PinHash) -> Self {
        Wallet {
            id: Uuid::new_v4(),
            user,
            balance: Decimal::ZERO,
            pin,
            created_at: Utc::now(),
        }
    }
}
