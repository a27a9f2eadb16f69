use thiserror::Error;

use crate::amount::Amount;
use crate::maturity::Epoch;

/// Rejections returned by [`crate::Delegation`] mutations.
///
/// Neither kind is retryable without the caller changing the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    /// The requested amount is zero or negative.
    #[error("invalid amount, must be positive")]
    InvalidAmount,

    /// The requested amount exceeds the active stake.
    #[error("insufficient balance to undelegate: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },
}

/// Failures while decoding ledger values from their external representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid address hex: {0}")]
    AddressHex(String),

    #[error("address must be {expected} bytes, got {actual}")]
    AddressLength { expected: usize, actual: usize },

    #[error("invalid decimal amount {0:?}")]
    Amount(String),

    #[error("undelegation entries out of order at epoch {epoch}")]
    UnorderedEntries { epoch: Epoch },

    #[error("undelegation entry at epoch {epoch} has non-positive amount")]
    NonPositiveEntry { epoch: Epoch },

    #[error("active stake is negative")]
    NegativeStake,
}
