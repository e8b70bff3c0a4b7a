use crate::{
    primitives::{
        AccountHandle, Amount, Arbiter, BlockNumber, Contribution, ParticipantId, ProtocolConfig,
    },
    vss::{PairingVss, VssProvider},
};
use rand_core::RngCore;
use threshold_vss::curve::bn254::{PairingCurve, Scalar, G1};

pub type TestVss = PairingVss<PairingCurve>;

pub const DEPOSIT: Amount = 100;
pub const WINDOW: BlockNumber = 3;

/// Generates `n` keypairs for the ids `1..=n`
pub fn keys<R: RngCore>(n: usize, rng: &mut R) -> (Vec<Scalar>, Vec<(ParticipantId, G1)>) {
    (1..=n as ParticipantId)
        .map(|id| {
            let (secret, public) = TestVss::keypair(rng);
            (secret, (id, public))
        })
        .unzip()
}

/// A small config with a deposit and a window which are easy to reason about
pub fn config(n: usize, t: usize) -> ProtocolConfig {
    ProtocolConfig {
        deposit: DEPOSIT,
        challenge_window: WINDOW,
        ..ProtocolConfig::new(n, t)
    }
}

pub fn account(i: ParticipantId) -> AccountHandle {
    AccountHandle::new(format!("0x{:040x}", i))
}

#[derive(Clone, Debug)]
pub struct Member {
    pub id: ParticipantId,
    pub account: AccountHandle,
    pub secret: Scalar,
    pub public: G1,
}

/// Enrolls `n` fresh members at block 1
pub fn enroll_all<R: RngCore>(
    arbiter: &mut Arbiter<TestVss>,
    n: usize,
    rng: &mut R,
) -> Vec<Member> {
    let (secrets, publics) = keys(n, rng);
    secrets
        .into_iter()
        .zip(publics)
        .map(|(secret, (i, public))| {
            let account = account(i);
            let id = arbiter
                .enroll(account.clone(), DEPOSIT, public, 1)
                .unwrap();
            Member {
                id,
                account,
                secret,
                public,
            }
        })
        .collect()
}

/// Every member deals to every member
pub fn deal<R: RngCore>(members: &[Member], t: usize, rng: &mut R) -> Vec<Contribution<TestVss>> {
    let recipients = members
        .iter()
        .map(|m| (m.id, m.public))
        .collect::<Vec<_>>();
    members
        .iter()
        .map(|m| TestVss::generate_contribution(m.id, &recipients, t, rng).unwrap())
        .collect()
}

pub fn commit_all(
    arbiter: &mut Arbiter<TestVss>,
    members: &[Member],
    contributions: &[Contribution<TestVss>],
    now: BlockNumber,
) {
    for (m, c) in members.iter().zip(contributions) {
        arbiter
            .submit_commitment(
                &m.account,
                m.id,
                c.commitment.g1.clone(),
                c.commitment.g2.clone(),
                c.shares.clone(),
                now,
            )
            .unwrap();
    }
}
