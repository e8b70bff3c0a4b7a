use super::{
    errors::Malformation,
    types::{EncryptedShare, ParticipantId, PolynomialCommitment},
};
use crate::vss::VssProvider;

use std::collections::BTreeMap;

/// Append-only storage of every dealer's commitment and encrypted shares.
///
/// Submissions are only checked for their shape. Shares are checked against
/// commitments when a complaint is filed.
#[derive(Clone, Debug)]
pub struct CommitmentLedger<V: VssProvider> {
    threshold: usize,
    participant_count: usize,
    commitments: BTreeMap<ParticipantId, PolynomialCommitment<V>>,
    /// Keyed by `(from, to)`
    shares: BTreeMap<(ParticipantId, ParticipantId), EncryptedShare<V>>,
}

impl<V: VssProvider> CommitmentLedger<V> {
    pub fn new(threshold: usize, participant_count: usize) -> Self {
        Self {
            threshold,
            participant_count,
            commitments: BTreeMap::new(),
            shares: BTreeMap::new(),
        }
    }

    pub fn has_committed(&self, id: ParticipantId) -> bool {
        self.commitments.contains_key(&id)
    }

    /// Checks the shape of a submission: `threshold` points in each group and
    /// exactly one share from `owner` to each of the ids `1..=participant_count`.
    pub fn validate(
        &self,
        owner: ParticipantId,
        g1: &[V::G1],
        g2: &[V::G2],
        shares: &[EncryptedShare<V>],
    ) -> Result<(), Malformation> {
        if g1.len() != self.threshold {
            return Err(Malformation::G1Length(g1.len(), self.threshold));
        }

        if g2.len() != self.threshold {
            return Err(Malformation::G2Length(g2.len(), self.threshold));
        }

        if shares.len() != self.participant_count {
            return Err(Malformation::ShareCount(
                shares.len(),
                self.participant_count,
            ));
        }

        let mut seen = vec![false; self.participant_count];
        for share in shares {
            let slot = match (share.to as usize).checked_sub(1) {
                Some(idx) => seen.get_mut(idx),
                None => None,
            };
            match slot {
                Some(flag) if !*flag && share.from == owner => *flag = true,
                _ => {
                    return Err(Malformation::Misaddressed {
                        from: share.from,
                        to: share.to,
                    })
                }
            }
        }

        Ok(())
    }

    /// Stores a submission. Callers must validate it first, a dealer's
    /// submission is never overwritten.
    pub(crate) fn insert(
        &mut self,
        commitment: PolynomialCommitment<V>,
        shares: Vec<EncryptedShare<V>>,
    ) {
        let owner = commitment.owner;
        if self.commitments.contains_key(&owner) {
            return;
        }

        for share in shares {
            self.shares.insert((share.from, share.to), share);
        }
        self.commitments.insert(owner, commitment);
    }

    pub fn commitment(&self, id: ParticipantId) -> Option<&PolynomialCommitment<V>> {
        self.commitments.get(&id)
    }

    pub fn share(&self, from: ParticipantId, to: ParticipantId) -> Option<&EncryptedShare<V>> {
        self.shares.get(&(from, to))
    }

    /// Commitments ordered by dealer id
    pub fn commitments(&self) -> impl Iterator<Item = &PolynomialCommitment<V>> {
        self.commitments.values()
    }

    pub fn committed_ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.commitments.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    /// True iff every one of `enrolled` has submitted, and there is at least one
    pub fn all_committed<I>(&self, enrolled: I) -> bool
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        let mut any = false;
        for id in enrolled {
            if !self.has_committed(id) {
                return false;
            }
            any = true;
        }
        any
    }
}
