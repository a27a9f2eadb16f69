use std::collections::BTreeMap;

use delegation_ledger::amount::serde_decimal;
use delegation_ledger::commitment::hash_amount;
use delegation_ledger::{Address, Amount, Delegation, DelegationError, Epoch, LockPolicy};
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub type AccountId = Address;
pub type ValidatorId = Address;

/// Delegations grouped by validator, then by delegator.
pub type DelegationBook = BTreeMap<ValidatorId, BTreeMap<AccountId, Delegation>>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown account {account}")]
    UnknownAccount { account: AccountId },
    #[error("insufficient funds in account {account}")]
    InsufficientFunds { account: AccountId },
    #[error("no delegation from {delegator} to validator {validator}")]
    UnknownDelegation {
        validator: ValidatorId,
        delegator: AccountId,
    },
    #[error(transparent)]
    Delegation(#[from] DelegationError),
    #[error("epoch {requested} precedes last finalized epoch {finalized}")]
    EpochRegression { requested: Epoch, finalized: Epoch },
    #[error("snapshot merkle root mismatch")]
    RootMismatch,
    #[error("delegation of {delegator} filed under {key} for validator {validator}")]
    DelegatorMismatch {
        validator: ValidatorId,
        key: AccountId,
        delegator: AccountId,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountBalance {
    #[serde(with = "serde_decimal")]
    pub available: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of transactions applied.
    pub height: u64,
    pub finalized_epoch: Option<Epoch>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub lock_period: Epoch,
    pub accounts: BTreeMap<AccountId, AccountBalance>,
    pub delegations: DelegationBook,
    pub events: Vec<LedgerEvent>,
    #[serde(with = "serde_root")]
    pub merkle_root: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Credited {
        to: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    Delegated {
        validator: ValidatorId,
        delegator: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    Undelegated {
        validator: ValidatorId,
        delegator: AccountId,
        epoch: Epoch,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    Released {
        validator: ValidatorId,
        delegator: AccountId,
        epoch: Epoch,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    EntryDeleted {
        validator: ValidatorId,
        delegator: AccountId,
        epoch: Epoch,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    RewardAccrued {
        validator: ValidatorId,
        delegator: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    RewardWithdrawn {
        validator: ValidatorId,
        delegator: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
}

/// One state change inside a staking transaction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMutation {
    Credit {
        to: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    Delegate {
        validator: ValidatorId,
        delegator: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    Undelegate {
        validator: ValidatorId,
        delegator: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    /// Administrative correction; skips maturity accounting entirely.
    DeleteEntry {
        validator: ValidatorId,
        delegator: AccountId,
        epoch: Epoch,
    },
    AccrueReward {
        validator: ValidatorId,
        delegator: AccountId,
        #[serde(with = "serde_decimal")]
        amount: Amount,
    },
    WithdrawReward {
        validator: ValidatorId,
        delegator: AccountId,
    },
}

/// Spendable balances plus every delegation, driven by staking transactions
/// and epoch finalization.
#[derive(Clone, Debug, Default)]
pub struct StakeLedger {
    pub meta: SnapshotMetadata,
    pub accounts: BTreeMap<AccountId, AccountBalance>,
    pub delegations: DelegationBook,
    pub events: Vec<LedgerEvent>,
    policy: LockPolicy,
}

impl StakeLedger {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.accounts
            .get(account)
            .map(|balance| balance.available.clone())
            .unwrap_or_default()
    }

    pub fn delegation(&self, validator: &ValidatorId, delegator: &AccountId) -> Option<&Delegation> {
        self.delegations.get(validator)?.get(delegator)
    }

    /// Locked-but-pending stake of one delegation; zero when there is none.
    pub fn total_in_undelegation(&self, validator: &ValidatorId, delegator: &AccountId) -> Amount {
        self.delegation(validator, delegator)
            .map(Delegation::total_in_undelegation)
            .unwrap_or_default()
    }

    pub fn credit_account(&mut self, account: &AccountId, amount: &Amount) {
        let balance = self.accounts.entry(*account).or_default();
        balance.available += amount;
    }

    pub fn debit_account(&mut self, account: &AccountId, amount: &Amount) -> Result<(), LedgerError> {
        let balance = self
            .accounts
            .get_mut(account)
            .ok_or(LedgerError::UnknownAccount { account: *account })?;
        if balance.available < *amount {
            return Err(LedgerError::InsufficientFunds { account: *account });
        }
        balance.available -= amount;
        Ok(())
    }

    /// Apply a staking transaction at `epoch`. Either every mutation takes
    /// effect or, on the first error, none of them do. `epoch` may not lie
    /// before the last finalized epoch, otherwise an undelegation could be
    /// back-dated past its lock period.
    pub fn apply_mutations(&mut self, mutations: &[LedgerMutation], epoch: Epoch) -> Result<(), LedgerError> {
        self.ensure_not_finalized_before(epoch)?;
        let mut staged = self.clone();
        for mutation in mutations {
            staged.apply_one(mutation, epoch)?;
        }
        staged.meta.height += 1;
        *self = staged;
        Ok(())
    }

    fn apply_one(&mut self, mutation: &LedgerMutation, epoch: Epoch) -> Result<(), LedgerError> {
        debug!(?mutation, epoch, "applying mutation");
        match mutation {
            LedgerMutation::Credit { to, amount } => {
                ensure_positive(amount)?;
                self.credit_account(to, amount);
                self.events.push(LedgerEvent::Credited {
                    to: *to,
                    amount: amount.clone(),
                });
            }
            LedgerMutation::Delegate {
                validator,
                delegator,
                amount,
            } => {
                ensure_positive(amount)?;
                self.debit_account(delegator, amount)?;
                self.delegations
                    .entry(*validator)
                    .or_default()
                    .entry(*delegator)
                    .or_insert_with(|| Delegation::empty(*delegator))
                    .delegate(amount)?;
                self.events.push(LedgerEvent::Delegated {
                    validator: *validator,
                    delegator: *delegator,
                    amount: amount.clone(),
                });
            }
            LedgerMutation::Undelegate {
                validator,
                delegator,
                amount,
            } => {
                self.delegation_mut(validator, delegator)?
                    .undelegate(epoch, amount)?;
                self.events.push(LedgerEvent::Undelegated {
                    validator: *validator,
                    delegator: *delegator,
                    epoch,
                    amount: amount.clone(),
                });
            }
            LedgerMutation::DeleteEntry {
                validator,
                delegator,
                epoch: entry_epoch,
            } => {
                let removed = self
                    .delegation_mut(validator, delegator)?
                    .delete_entry(*entry_epoch);
                if let Some(entry) = removed {
                    warn!(
                        %validator,
                        %delegator,
                        epoch = entry_epoch,
                        amount = %entry.amount,
                        "undelegation entry deleted outside maturity"
                    );
                    self.events.push(LedgerEvent::EntryDeleted {
                        validator: *validator,
                        delegator: *delegator,
                        epoch: *entry_epoch,
                        amount: entry.amount,
                    });
                }
            }
            LedgerMutation::AccrueReward {
                validator,
                delegator,
                amount,
            } => {
                self.delegation_mut(validator, delegator)?
                    .add_reward(amount)?;
                self.events.push(LedgerEvent::RewardAccrued {
                    validator: *validator,
                    delegator: *delegator,
                    amount: amount.clone(),
                });
            }
            LedgerMutation::WithdrawReward {
                validator,
                delegator,
            } => {
                let reward = self.delegation_mut(validator, delegator)?.withdraw_reward();
                if reward.is_positive() {
                    self.credit_account(delegator, &reward);
                    self.events.push(LedgerEvent::RewardWithdrawn {
                        validator: *validator,
                        delegator: *delegator,
                        amount: reward,
                    });
                }
            }
        }
        Ok(())
    }

    fn delegation_mut(
        &mut self,
        validator: &ValidatorId,
        delegator: &AccountId,
    ) -> Result<&mut Delegation, LedgerError> {
        self.delegations
            .get_mut(validator)
            .and_then(|by_delegator| by_delegator.get_mut(delegator))
            .ok_or(LedgerError::UnknownDelegation {
                validator: *validator,
                delegator: *delegator,
            })
    }

    /// Release every matured undelegation at `epoch`, crediting each
    /// delegator's spendable balance, and drop delegations left empty.
    /// Returns the total released.
    pub fn finalize_epoch(&mut self, epoch: Epoch) -> Result<Amount, LedgerError> {
        self.ensure_not_finalized_before(epoch)?;

        let mut credits = Vec::new();
        for (validator, by_delegator) in self.delegations.iter_mut() {
            for (delegator, delegation) in by_delegator.iter_mut() {
                let released = delegation.remove_unlocked_undelegations(epoch, &self.policy);
                if released.is_positive() {
                    credits.push((*validator, *delegator, released));
                }
            }
            by_delegator.retain(|_, delegation| !delegation.is_empty());
        }
        self.delegations.retain(|_, by_delegator| !by_delegator.is_empty());

        let mut total = Amount::zero();
        for (validator, delegator, amount) in credits {
            self.credit_account(&delegator, &amount);
            total += &amount;
            self.events.push(LedgerEvent::Released {
                validator,
                delegator,
                epoch,
                amount,
            });
        }
        self.meta.finalized_epoch = Some(epoch);
        info!(epoch, released = %total, "epoch finalized");
        Ok(total)
    }

    fn ensure_not_finalized_before(&self, epoch: Epoch) -> Result<(), LedgerError> {
        match self.meta.finalized_epoch {
            Some(finalized) if epoch < finalized => Err(LedgerError::EpochRegression {
                requested: epoch,
                finalized,
            }),
            _ => Ok(()),
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            lock_period: self.policy.lock_period,
            accounts: self.accounts.clone(),
            delegations: self.delegations.clone(),
            events: self.events.clone(),
            merkle_root: compute_merkle_root(
                &self.meta,
                self.policy.lock_period,
                &self.accounts,
                &self.delegations,
            ),
        }
    }

    /// Rebuild a ledger from `snapshot`, refusing it if a delegation is
    /// filed under someone else's key or the stored root does not match its
    /// contents.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        for (validator, by_delegator) in &snapshot.delegations {
            for (key, delegation) in by_delegator {
                if key != delegation.delegator() {
                    return Err(LedgerError::DelegatorMismatch {
                        validator: *validator,
                        key: *key,
                        delegator: *delegation.delegator(),
                    });
                }
            }
        }
        let root = compute_merkle_root(
            &snapshot.meta,
            snapshot.lock_period,
            &snapshot.accounts,
            &snapshot.delegations,
        );
        if root != snapshot.merkle_root {
            return Err(LedgerError::RootMismatch);
        }
        Ok(Self {
            meta: snapshot.meta,
            accounts: snapshot.accounts,
            delegations: snapshot.delegations,
            events: snapshot.events,
            policy: LockPolicy::new(snapshot.lock_period),
        })
    }
}

fn ensure_positive(amount: &Amount) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(DelegationError::InvalidAmount.into())
    }
}

fn compute_merkle_root(
    meta: &SnapshotMetadata,
    lock_period: Epoch,
    accounts: &BTreeMap<AccountId, AccountBalance>,
    delegations: &DelegationBook,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();

    let mut hasher = Sha256::new();
    hasher.update(b"meta");
    hasher.update(lock_period.to_le_bytes());
    hasher.update(meta.height.to_le_bytes());
    match meta.finalized_epoch {
        Some(epoch) => {
            hasher.update([1u8]);
            hasher.update(epoch.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    leaves.push(hasher.finalize().into());

    for (account, balance) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(account.as_bytes());
        hash_amount(&mut hasher, &balance.available);
        leaves.push(hasher.finalize().into());
    }
    for (validator, by_delegator) in delegations {
        for (delegator, delegation) in by_delegator {
            let mut hasher = Sha256::new();
            hasher.update(b"bond");
            hasher.update(validator.as_bytes());
            hasher.update(delegator.as_bytes());
            hasher.update(delegation.commitment());
            leaves.push(hasher.finalize().into());
        }
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"stake-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod serde_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("merkle root must be 32 bytes"))
    }
}
