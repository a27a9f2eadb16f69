use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Address;
use crate::amount::{serde_decimal, Amount};
use crate::error::{DecodeError, DelegationError};
use crate::maturity::{Epoch, LockPolicy};

/// One pending withdrawal: stake moved out of the active balance at `epoch`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UndelegationEntry {
    #[serde(with = "serde_decimal")]
    pub amount: Amount,
    /// Epoch of the request, not of maturity.
    pub epoch: Epoch,
}

/// Bond between one delegator and one validator.
///
/// `entries` is kept strictly ascending by epoch with positive amounts, and
/// `amount` never goes negative. Decoding re-checks both.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "DelegationRecord")]
pub struct Delegation {
    delegator: Address,
    #[serde(with = "serde_decimal")]
    amount: Amount,
    #[serde(with = "serde_decimal")]
    reward: Amount,
    entries: Vec<UndelegationEntry>,
}

impl Delegation {
    /// Fresh delegation with no reward and no pending undelegations.
    /// Negative stake is rejected with `InvalidAmount`; zero is allowed.
    pub fn new(delegator: Address, amount: Amount) -> Result<Self, DelegationError> {
        if amount.is_negative() {
            return Err(DelegationError::InvalidAmount);
        }
        Ok(Self {
            amount,
            ..Self::empty(delegator)
        })
    }

    /// Delegation holding nothing yet.
    pub fn empty(delegator: Address) -> Self {
        Self {
            delegator,
            amount: Amount::zero(),
            reward: Amount::zero(),
            entries: Vec::new(),
        }
    }

    pub fn delegator(&self) -> &Address {
        &self.delegator
    }

    /// Active stake.
    pub fn amount(&self) -> &Amount {
        &self.amount
    }

    pub fn reward(&self) -> &Amount {
        &self.reward
    }

    /// Pending undelegations, ascending by epoch.
    pub fn entries(&self) -> &[UndelegationEntry] {
        &self.entries
    }

    /// Add stake to the active balance.
    pub fn delegate(&mut self, amount: &Amount) -> Result<(), DelegationError> {
        if !amount.is_positive() {
            return Err(DelegationError::InvalidAmount);
        }
        self.amount += amount;
        Ok(())
    }

    /// Move `amount` of active stake into the undelegation queue at `epoch`.
    ///
    /// A second request in the same epoch is merged into the existing entry.
    /// Nothing is mutated when the request is rejected.
    pub fn undelegate(&mut self, epoch: Epoch, amount: &Amount) -> Result<(), DelegationError> {
        if !amount.is_positive() {
            return Err(DelegationError::InvalidAmount);
        }
        if self.amount < *amount {
            return Err(DelegationError::InsufficientBalance {
                requested: amount.clone(),
                available: self.amount.clone(),
            });
        }
        self.amount -= amount;

        match self.entries.binary_search_by_key(&epoch, |entry| entry.epoch) {
            Ok(idx) => self.entries[idx].amount += amount,
            Err(idx) => self.entries.insert(
                idx,
                UndelegationEntry {
                    amount: amount.clone(),
                    epoch,
                },
            ),
        }
        debug!(
            delegator = %self.delegator,
            epoch,
            %amount,
            pending = self.entries.len(),
            "undelegated"
        );
        Ok(())
    }

    /// Sum of all pending undelegations.
    pub fn total_in_undelegation(&self) -> Amount {
        self.entries.iter().map(|entry| &entry.amount).sum()
    }

    /// Active stake plus everything still locked in the queue.
    pub fn bonded_total(&self) -> Amount {
        &self.amount + self.total_in_undelegation()
    }

    /// Drop every entry whose lock period has elapsed at `current` and return
    /// their summed amount. The caller credits it to a spendable balance;
    /// active stake is not touched.
    pub fn remove_unlocked_undelegations(&mut self, current: Epoch, policy: &LockPolicy) -> Amount {
        // Entries are ascending, so everything after the first locked one is locked too.
        let matured = self
            .entries
            .iter()
            .take_while(|entry| policy.is_unlocked(current, entry.epoch))
            .count();
        if matured == 0 {
            return Amount::zero();
        }
        let released: Amount = self.entries.drain(..matured).map(|entry| entry.amount).sum();
        debug!(
            delegator = %self.delegator,
            current,
            matured,
            %released,
            "released undelegations"
        );
        released
    }

    /// Remove the entry requested at `epoch`, if any. Other entries keep
    /// their order.
    pub fn delete_entry(&mut self, epoch: Epoch) -> Option<UndelegationEntry> {
        let idx = self
            .entries
            .binary_search_by_key(&epoch, |entry| entry.epoch)
            .ok()?;
        Some(self.entries.remove(idx))
    }

    /// Epoch at which the oldest pending entry becomes releasable.
    pub fn next_unlock_epoch(&self, policy: &LockPolicy) -> Option<Epoch> {
        self.entries
            .first()
            .and_then(|entry| policy.release_epoch(entry.epoch))
    }

    pub fn add_reward(&mut self, amount: &Amount) -> Result<(), DelegationError> {
        if !amount.is_positive() {
            return Err(DelegationError::InvalidAmount);
        }
        self.reward += amount;
        Ok(())
    }

    /// Take the whole accrued reward, leaving zero behind.
    pub fn withdraw_reward(&mut self) -> Amount {
        std::mem::take(&mut self.reward)
    }

    /// No stake, reward or pending undelegation left.
    pub fn is_empty(&self) -> bool {
        self.amount.is_zero() && self.reward.is_zero() && self.entries.is_empty()
    }
}

#[derive(Deserialize)]
struct DelegationRecord {
    delegator: Address,
    #[serde(with = "serde_decimal")]
    amount: Amount,
    #[serde(with = "serde_decimal")]
    reward: Amount,
    #[serde(default)]
    entries: Vec<UndelegationEntry>,
}

impl TryFrom<DelegationRecord> for Delegation {
    type Error = DecodeError;

    fn try_from(record: DelegationRecord) -> Result<Self, Self::Error> {
        if record.amount.is_negative() {
            return Err(DecodeError::NegativeStake);
        }
        for entry in &record.entries {
            if !entry.amount.is_positive() {
                return Err(DecodeError::NonPositiveEntry { epoch: entry.epoch });
            }
        }
        for pair in record.entries.windows(2) {
            if pair[0].epoch >= pair[1].epoch {
                return Err(DecodeError::UnorderedEntries {
                    epoch: pair[1].epoch,
                });
            }
        }
        Ok(Self {
            delegator: record.delegator,
            amount: record.amount,
            reward: record.reward,
            entries: record.entries,
        })
    }
}
