use super::types::{Amount, ParticipantId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How the escrowed deposits were released.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Amount paid out to each participant which did not forfeit
    pub payouts: BTreeMap<ParticipantId, Amount>,
    /// Deposits which were forfeited and redistributed
    pub forfeited: Vec<(ParticipantId, Amount)>,
    /// Forfeited funds nobody was eligible to receive
    pub unclaimed: Amount,
}

impl Settlement {
    pub fn payout(&self, id: ParticipantId) -> Amount {
        self.payouts.get(&id).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Amount {
        self.payouts.values().sum::<Amount>() + self.unclaimed
    }
}

/// Holds deposits until the instance resolves. Released exactly once.
#[derive(Debug, Clone, Default)]
pub struct Escrow {
    deposits: BTreeMap<ParticipantId, Amount>,
    settlement: Option<Settlement>,
}

impl Escrow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, id: ParticipantId, amount: Amount) {
        *self.deposits.entry(id).or_default() += amount;
    }

    /// Whether `amount` can be added without the held total overflowing
    pub fn can_hold(&self, amount: Amount) -> bool {
        self.held().checked_add(amount).is_some()
    }

    /// The total currently held
    pub fn held(&self) -> Amount {
        if self.settlement.is_some() {
            return 0;
        }
        self.deposits
            .values()
            .fold(0, |total: Amount, amount| total.saturating_add(*amount))
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    /// Releases the escrow. The deposits of `forfeiting` are pooled and split
    /// evenly between everybody else, who also get their own deposit back.
    /// What does not divide evenly goes one unit at a time to the lowest ids.
    ///
    /// Returns `None` if the escrow was already released.
    pub fn settle(&mut self, forfeiting: &[ParticipantId]) -> Option<&Settlement> {
        if self.settlement.is_some() {
            return None;
        }

        let forfeiting: BTreeSet<_> = forfeiting.iter().copied().collect();
        let mut settlement = Settlement::default();
        let mut pot: Amount = 0;
        for (id, amount) in &self.deposits {
            if forfeiting.contains(id) {
                settlement.forfeited.push((*id, *amount));
                pot = pot.saturating_add(*amount);
            } else {
                settlement.payouts.insert(*id, *amount);
            }
        }

        let beneficiaries = settlement.payouts.len() as Amount;
        if beneficiaries == 0 {
            settlement.unclaimed = pot;
        } else {
            let share = pot / beneficiaries;
            let mut remainder = pot % beneficiaries;
            for payout in settlement.payouts.values_mut() {
                *payout += share;
                if remainder > 0 {
                    *payout += 1;
                    remainder -= 1;
                }
            }
        }

        self.settlement = Some(settlement);
        self.settlement.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn escrow(deposits: &[Amount]) -> Escrow {
        let mut escrow = Escrow::new();
        for (i, amount) in deposits.iter().enumerate() {
            escrow.deposit(i as ParticipantId + 1, *amount);
        }
        escrow
    }

    #[test]
    fn refund_everyone() {
        let mut escrow = escrow(&[10, 10, 10]);
        assert_eq!(escrow.held(), 30);
        let s = escrow.settle(&[]).unwrap().clone();
        assert_eq!(s.payout(1), 10);
        assert_eq!(s.payout(3), 10);
        assert!(s.forfeited.is_empty());
        assert_eq!(escrow.held(), 0);
    }

    #[test]
    fn redistribute_forfeit() {
        let mut escrow = escrow(&[10, 10, 10, 10, 10]);
        let s = escrow.settle(&[1]).unwrap().clone();
        assert_eq!(s.payout(1), 0);
        // 10 split four ways, the remainder of 2 goes to ids 2 and 3
        for id in 2..=5 {
            let expected = if id <= 3 { 13 } else { 12 };
            assert_eq!(s.payout(id), expected);
        }
        assert_eq!(s.forfeited, vec![(1, 10)]);
        assert_eq!(s.total(), 50);
    }

    #[test]
    fn settles_once() {
        let mut escrow = escrow(&[10, 10]);
        escrow.settle(&[2]).unwrap();
        assert!(escrow.settle(&[]).is_none());
        assert_eq!(escrow.settlement().unwrap().payout(1), 20);
    }

    #[test]
    fn nobody_left() {
        let mut escrow = escrow(&[7, 8]);
        let s = escrow.settle(&[1, 2]).unwrap();
        assert!(s.payouts.is_empty());
        assert_eq!(s.unclaimed, 15);
    }

    #[test]
    fn large_deposits_fit() {
        let mut escrow = escrow(&[Amount::MAX - 5, 5]);
        assert_eq!(escrow.held(), Amount::MAX);
        assert!(escrow.can_hold(0));
        assert!(!escrow.can_hold(1));

        let s = escrow.settle(&[2]).unwrap();
        assert_eq!(s.payout(1), Amount::MAX);
        assert_eq!(s.total(), Amount::MAX);
    }

    proptest! {
        #[test]
        fn conserves_value(
            deposits in proptest::collection::vec(1..1_000_000u64, 1..20),
            forfeit_mask in any::<u32>(),
        ) {
            let deposits: Vec<Amount> = deposits.into_iter().map(Amount::from).collect();
            let forfeiting = (1..=deposits.len() as ParticipantId)
                .filter(|id| forfeit_mask & (1 << (id - 1)) != 0)
                .collect::<Vec<_>>();

            let mut escrow = escrow(&deposits);
            let total = escrow.held();
            let s = escrow.settle(&forfeiting).unwrap();
            prop_assert_eq!(s.total(), total);
            for id in forfeiting {
                prop_assert_eq!(s.payout(id), 0);
            }
        }
    }
}
