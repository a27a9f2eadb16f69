//! Delegation ledger primitives.
//!
//! A [`Delegation`] tracks one delegator's stake against one validator:
//!
//! * active stake and accrued reward, both exact [`Amount`]s;
//! * a queue of [`UndelegationEntry`] values, ascending by request epoch with
//!   at most one entry per epoch;
//! * release of matured entries according to a [`LockPolicy`].
//!
//! Records are plain data. Callers serialise mutation of any given record;
//! every operation is synchronous and deterministic.

pub mod address;
pub mod amount;
pub mod commitment;
pub mod delegation;
pub mod maturity;

mod error;

pub use address::Address;
pub use amount::Amount;
pub use delegation::{Delegation, UndelegationEntry};
pub use error::{DecodeError, DelegationError};
pub use maturity::{Epoch, LockPolicy, LOCK_PERIOD_IN_EPOCHS};
