//! Transaction PIN hashing
//!
//! PINs are exactly four ASCII digits. They are stored as
//! `hex(sha256(salt || pin))` with a fresh 16-byte random salt per hash.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::types::{EscrowError, PinHash};

const SALT_LEN: usize = 16;

/// Check that a PIN is exactly four ASCII digits
pub fn validate(pin: &str) -> Result<(), EscrowError> {
    if pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(EscrowError::precheck_failed("PIN must be exactly 4 digits"))
    }
}

/// Validate and hash a PIN with a new random salt
pub fn hash(pin: &str) -> Result<PinHash, EscrowError> {
    validate(pin)?;

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    Ok(PinHash {
        salt: hex::encode(salt),
        digest: digest(&salt, pin),
    })
}

/// Whether `pin` matches the stored hash
pub fn verify(pin: &str, stored: &PinHash) -> bool {
    match hex::decode(&stored.salt) {
        Ok(salt) => digest(&salt, pin) == stored.digest,
        Err(_) => false,
    }
}

fn digest(salt: &[u8], pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}
