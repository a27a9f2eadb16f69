//! Lock-period maturity of undelegation entries.

use serde::{Deserialize, Serialize};

pub type Epoch = u64;

/// Number of epochs an undelegated amount stays locked on a default network.
pub const LOCK_PERIOD_IN_EPOCHS: Epoch = 14;

/// Decides when an undelegation requested at some epoch may be released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    pub lock_period: Epoch,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::new(LOCK_PERIOD_IN_EPOCHS)
    }
}

impl LockPolicy {
    pub const fn new(lock_period: Epoch) -> Self {
        Self { lock_period }
    }

    /// True once strictly more than `lock_period` epochs separate the request
    /// from `current`. A request epoch in the future is never unlocked.
    pub fn is_unlocked(&self, current: Epoch, requested: Epoch) -> bool {
        match current.checked_sub(requested) {
            Some(elapsed) => elapsed > self.lock_period,
            None => false,
        }
    }

    /// First epoch at which an entry requested at `requested` is released,
    /// or `None` if that epoch is not representable.
    pub fn release_epoch(&self, requested: Epoch) -> Option<Epoch> {
        requested.checked_add(self.lock_period)?.checked_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_strict() {
        let policy = LockPolicy::default();
        assert!(!policy.is_unlocked(20 + 14, 20));
        assert!(policy.is_unlocked(20 + 15, 20));
        assert_eq!(policy.release_epoch(20), Some(35));
    }

    #[test]
    fn future_requests_never_unlock() {
        let policy = LockPolicy::new(0);
        assert!(!policy.is_unlocked(3, 7));
        assert!(!policy.is_unlocked(0, Epoch::MAX));
        assert!(!policy.is_unlocked(5, 5));
        assert!(policy.is_unlocked(6, 5));
    }

    #[test]
    fn release_epoch_overflow() {
        let policy = LockPolicy::default();
        assert_eq!(policy.release_epoch(Epoch::MAX - 14), None);
        assert_eq!(policy.release_epoch(Epoch::MAX - 15), Some(Epoch::MAX));
    }
}
