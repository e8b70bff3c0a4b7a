use super::{
    errors::Reason,
    types::{AccountHandle, Amount, Gas, Participant, ParticipantId},
};
use crate::vss::VssProvider;

use std::collections::HashMap;

/// The set of enrolled participants. Ids are assigned sequentially from 1 in
/// join order and never reused.
#[derive(Clone, Debug)]
pub struct Registry<V: VssProvider> {
    participants: Vec<Participant<V>>,
    by_account: HashMap<AccountHandle, ParticipantId>,
    capacity: usize,
    required_deposit: Amount,
}

impl<V: VssProvider> Registry<V> {
    pub fn new(capacity: usize, required_deposit: Amount) -> Self {
        Self {
            participants: Vec::with_capacity(capacity),
            by_account: HashMap::with_capacity(capacity),
            capacity,
            required_deposit,
        }
    }

    /// Enrolls `account` and returns its id. Does not know about phases, the
    /// caller must only call it during enrollment.
    pub fn enroll(
        &mut self,
        account: AccountHandle,
        deposit: Amount,
        public_key: V::G1,
    ) -> Result<ParticipantId, Reason> {
        if self.is_full() {
            return Err(Reason::RegistrationClosed);
        }

        if deposit < self.required_deposit {
            return Err(Reason::InsufficientDeposit {
                provided: deposit,
                required: self.required_deposit,
            });
        }

        if self.by_account.contains_key(&account) {
            return Err(Reason::AlreadyEnrolled);
        }

        let id = self.participants.len() as ParticipantId + 1;
        self.by_account.insert(account.clone(), id);
        self.participants.push(Participant {
            id,
            account,
            public_key,
            deposit,
            committed: false,
            gas_spent: 0,
        });

        Ok(id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant<V>> {
        let idx = (id as usize).checked_sub(1)?;
        self.participants.get(idx)
    }

    fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant<V>> {
        let idx = (id as usize).checked_sub(1)?;
        self.participants.get_mut(idx)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the id enrolled by `account`
    pub fn id_of(&self, account: &AccountHandle) -> Option<ParticipantId> {
        self.by_account.get(account).copied()
    }

    /// Checks that `id` is enrolled and owned by `sender`
    pub fn authenticate(&self, sender: &AccountHandle, id: ParticipantId) -> Result<(), Reason> {
        match self.get(id) {
            None => Err(Reason::NotEnrolled),
            Some(p) if &p.account != sender => Err(Reason::SenderMismatch),
            Some(_) => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant<V>> {
        self.participants.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().map(|p| p.id)
    }

    /// Adds observational gas to an enrolled participant
    pub fn charge_gas(&mut self, id: ParticipantId, gas: Gas) {
        if let Some(p) = self.get_mut(id) {
            p.gas_spent = p.gas_spent.saturating_add(gas);
        }
    }

    pub(crate) fn mark_committed(&mut self, id: ParticipantId) {
        if let Some(p) = self.get_mut(id) {
            p.committed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestVss;
    use threshold_vss::{curve::bn254::G1, group::Element};

    fn registry(n: usize) -> Registry<TestVss> {
        Registry::new(n, 10)
    }

    #[test]
    fn sequential_ids() {
        let mut reg = registry(3);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let id = reg.enroll((*name).into(), 10, G1::one()).unwrap();
            assert_eq!(id, i as ParticipantId + 1);
        }
        assert!(reg.is_full());
        assert_eq!(reg.id_of(&"b".into()), Some(2));
        assert_eq!(reg.get(3).unwrap().account, "c".into());
        assert!(reg.get(0).is_none());
        assert!(reg.get(4).is_none());
    }

    #[test]
    fn rejections() {
        let mut reg = registry(2);
        assert_eq!(
            reg.enroll("a".into(), 9, G1::one()).unwrap_err(),
            Reason::InsufficientDeposit {
                provided: 9,
                required: 10
            }
        );
        reg.enroll("a".into(), 11, G1::one()).unwrap();
        assert_eq!(
            reg.enroll("a".into(), 10, G1::one()).unwrap_err(),
            Reason::AlreadyEnrolled
        );
        reg.enroll("b".into(), 10, G1::one()).unwrap();
        assert_eq!(
            reg.enroll("c".into(), 10, G1::one()).unwrap_err(),
            Reason::RegistrationClosed
        );
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn authentication_and_gas() {
        let mut reg = registry(2);
        let id = reg.enroll("a".into(), 10, G1::one()).unwrap();
        reg.authenticate(&"a".into(), id).unwrap();
        assert_eq!(
            reg.authenticate(&"b".into(), id).unwrap_err(),
            Reason::SenderMismatch
        );
        assert_eq!(
            reg.authenticate(&"a".into(), 2).unwrap_err(),
            Reason::NotEnrolled
        );

        reg.charge_gas(id, 21_000);
        reg.charge_gas(id, 1_000);
        reg.charge_gas(7, 1_000);
        assert_eq!(reg.get(id).unwrap().gas_spent, 22_000);
    }
}
