//! Deterministic SHA-256 commitments over delegation state.
//!
//! The byte layout is fixed so that two replicas holding equal records agree
//! on the digest regardless of how they serialised them.

use sha2::{Digest, Sha256};

use crate::amount::Amount;
use crate::delegation::Delegation;

impl Delegation {
    /// Digest of delegator, active stake, reward and every pending entry in
    /// queue order.
    pub fn commitment(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"delegation");
        hasher.update(self.delegator().as_bytes());
        hash_amount(&mut hasher, self.amount());
        hash_amount(&mut hasher, self.reward());
        hasher.update((self.entries().len() as u64).to_le_bytes());
        for entry in self.entries() {
            hasher.update(entry.epoch.to_le_bytes());
            hash_amount(&mut hasher, &entry.amount);
        }
        hasher.finalize().into()
    }
}

/// Feed `amount` into `hasher` as length-prefixed little-endian two's
/// complement, so adjacent amounts cannot run into each other.
pub fn hash_amount(hasher: &mut Sha256, amount: &Amount) {
    let bytes = amount.to_signed_bytes_le();
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(&bytes);
}
