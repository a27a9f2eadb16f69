use delegation_ledger::{Address, Amount, Delegation, DelegationError, Epoch, LockPolicy};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn fresh(amount: u64) -> Delegation {
    Delegation::new(Address::from_bytes([0x42; 20]), Amount::from(amount)).unwrap()
}

/// Undelegate and check that the outcome matches the request: success only
/// for a positive amount within the active stake, the matching error kind
/// otherwise, and no mutation on error.
fn undelegate_checked(d: &mut Delegation, epoch: Epoch, amount: &Amount) -> Result<(), TestCaseError> {
    let before = d.clone();
    match d.undelegate(epoch, amount) {
        Ok(()) => {
            prop_assert!(amount > &Amount::from(0));
            prop_assert_eq!(d.amount(), &(before.amount() - amount));
        }
        Err(DelegationError::InvalidAmount) => {
            prop_assert!(amount <= &Amount::from(0));
            prop_assert_eq!(&*d, &before);
        }
        Err(DelegationError::InsufficientBalance { requested, available }) => {
            prop_assert!(amount > &Amount::from(0));
            prop_assert_eq!(&requested, amount);
            prop_assert_eq!(&available, before.amount());
            prop_assert!(requested > available);
            prop_assert_eq!(&*d, &before);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn stake_is_conserved(
        initial in 0u64..1_000_000,
        requests in prop::collection::vec((0u64..40, 1u64..50_000), 0..40),
        releases in prop::collection::vec(0u64..80, 0..10),
    ) {
        let policy = LockPolicy::default();
        let mut d = fresh(initial);
        for (epoch, amount) in requests {
            undelegate_checked(&mut d, epoch, &Amount::from(amount))?;
        }
        let mut released = Amount::from(0);
        for epoch in releases {
            released += d.remove_unlocked_undelegations(epoch, &policy);
        }
        prop_assert_eq!(
            Amount::from(initial),
            d.amount() + released + d.total_in_undelegation()
        );
    }

    #[test]
    fn entries_stay_sorted_and_unique(
        requests in prop::collection::vec((0u64..20, -5i64..100), 0..60),
    ) {
        let mut d = fresh(10_000);
        for (epoch, amount) in requests {
            undelegate_checked(&mut d, epoch, &Amount::from(amount))?;
        }
        for pair in d.entries().windows(2) {
            prop_assert!(pair[0].epoch < pair[1].epoch);
        }
        for entry in d.entries() {
            prop_assert!(entry.amount > Amount::from(0));
        }
        prop_assert!(d.amount() >= &Amount::from(0));
    }

    #[test]
    fn same_epoch_requests_merge(epoch in any::<u64>(), a in 1u64..1_000, b in 1u64..1_000) {
        let mut d = fresh(2_000);
        d.undelegate(epoch, &Amount::from(a)).unwrap();
        d.undelegate(epoch, &Amount::from(b)).unwrap();
        prop_assert_eq!(d.entries().len(), 1);
        prop_assert_eq!(&d.entries()[0].amount, &Amount::from(a + b));
    }

    #[test]
    fn release_never_panics(current in any::<u64>(), requested in any::<u64>(), lock in any::<u64>()) {
        let mut d = fresh(1);
        d.undelegate(requested, &Amount::from(1)).unwrap();
        let released = d.remove_unlocked_undelegations(current, &LockPolicy::new(lock));
        let expected = current.checked_sub(requested).map_or(false, |e| e > lock);
        prop_assert_eq!(released == Amount::from(1), expected);
    }
}

/// Replays a seeded stream of staking traffic and checks the invariants after
/// every step, the way a block processor would drive the record.
#[test]
fn seeded_replay_preserves_invariants() {
    let policy = LockPolicy::default();
    let mut rng = StdRng::seed_from_u64(0x5EED_0014);
    let mut d = fresh(0);
    let mut deposited = Amount::from(0);
    let mut withdrawn = Amount::from(0);
    let mut epoch: Epoch = 0;

    for _ in 0..2_000 {
        match rng.gen_range(0..4) {
            0 => {
                let amount = Amount::from(rng.gen_range(1u64..10_000));
                d.delegate(&amount).unwrap();
                deposited += amount;
            }
            1 => {
                let amount = Amount::from(rng.gen_range(-10i64..5_000));
                match d.undelegate(epoch, &amount) {
                    Ok(()) | Err(DelegationError::InvalidAmount) => {}
                    Err(DelegationError::InsufficientBalance { requested, available }) => {
                        assert!(requested > available);
                    }
                }
            }
            2 => epoch += rng.gen_range(0..4),
            _ => withdrawn += d.remove_unlocked_undelegations(epoch, &policy),
        }
        assert_eq!(
            deposited,
            d.amount() + &withdrawn + d.total_in_undelegation()
        );
        assert!(d.entries().windows(2).all(|p| p[0].epoch < p[1].epoch));
    }
}
