//! # VSS Provider
//!
//! The arithmetic seam of the DKG. The arbiter and the orchestrator never touch
//! curve points directly, they go through a [`VssProvider`]. [`PairingVss`] is
//! the implementation over any [`PairingCurve`], with shares encrypted to the
//! recipient's `G1` key using ECIES.
use crate::primitives::{
    Contribution, EncryptedShare, FeldmanCheck, ParticipantId, PolynomialCommitment,
};

use rand_core::RngCore;
use std::{fmt::Debug, marker::PhantomData};
use thiserror::Error;
use threshold_vss::{
    ecies::{self, EciesCipher, EciesError},
    encoding::{Encode, FixedSize},
    group::{Element, G1Curve, PairingCurve, Point, Scalar},
    poly::Poly,
};

/// Key generation, dealing and verification of Feldman VSS shares.
pub trait VssProvider: Clone + Debug + Send + Sync + 'static {
    /// Secret keys and shares
    type Scalar: Clone + Debug + PartialEq + FixedSize + Send + Sync;
    /// Encryption keys and the first commitment group
    type G1: Clone + Debug + PartialEq + FixedSize + Send + Sync;
    /// The second commitment group, where the group key lives
    type G2: Clone + Debug + PartialEq + FixedSize + Send + Sync;
    /// An encrypted share
    type Ciphertext: Clone + Debug + PartialEq + Encode + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Samples a new encryption keypair
    fn keypair<R: RngCore>(rng: &mut R) -> (Self::Scalar, Self::G1);

    /// Derives the public key which corresponds to `secret`
    fn public_key(secret: &Self::Scalar) -> Self::G1;

    /// Whether shares can safely be encrypted to `public`. The identity has
    /// the known secret key zero.
    fn is_valid_key(public: &Self::G1) -> bool;

    /// Samples a polynomial of degree `threshold - 1`, commits to it in both
    /// groups and encrypts its evaluation at each recipient's id to the
    /// recipient's key.
    fn generate_contribution<R: RngCore>(
        dealer: ParticipantId,
        recipients: &[(ParticipantId, Self::G1)],
        threshold: usize,
        rng: &mut R,
    ) -> Result<Contribution<Self>, Self::Error>;

    /// Checks `share` against the commitment evaluated at `recipient`, in each group
    fn verify_share(
        commitment: &PolynomialCommitment<Self>,
        recipient: ParticipantId,
        share: &Self::Scalar,
    ) -> FeldmanCheck;

    /// Checks with a pairing that both commitment vectors commit to the same coefficients
    fn verify_public_commitment(commitment: &PolynomialCommitment<Self>) -> bool;

    /// Decrypts a share with the recipient's secret key
    fn decrypt_share(
        secret: &Self::Scalar,
        ciphertext: &Self::Ciphertext,
    ) -> Result<Self::Scalar, Self::Error>;

    /// Sum of the constant terms of the `G2` commitments
    fn group_public_key<'a, I>(commitments: I) -> Self::G2
    where
        I: IntoIterator<Item = &'a PolynomialCommitment<Self>>;

    /// Sum of the `G2` commitments evaluated at `id`, i.e. the public key of
    /// `id`'s combined share
    fn member_public_key<'a, I>(commitments: I, id: ParticipantId) -> Self::G2
    where
        I: IntoIterator<Item = &'a PolynomialCommitment<Self>>;

    /// Sums the shares received from every dealer into the final secret share
    fn combine_shares(shares: &[Self::Scalar]) -> Self::Scalar;
}

#[derive(Debug, Error)]
pub enum VssError {
    #[error("threshold {0} is not in range [1,{1}]")]
    InvalidThreshold(usize, usize),
    #[error(transparent)]
    Ecies(#[from] EciesError),
    /// BincodeError is raised when de(serialization) of a share fails
    #[error("de(serialization failed: {0})")]
    BincodeError(#[from] bincode::Error),
}

/// Feldman VSS over a pairing curve.
#[derive(Debug)]
pub struct PairingVss<P: PairingCurve>(PhantomData<P>);

impl<P: PairingCurve> Clone for PairingVss<P> {
    fn clone(&self) -> Self {
        Self(PhantomData)
    }
}

impl<P> VssProvider for PairingVss<P>
where
    P: PairingCurve + 'static,
{
    type Scalar = P::Scalar;
    type G1 = P::G1;
    type G2 = P::G2;
    type Ciphertext = EciesCipher<G1Curve<P>>;
    type Error = VssError;

    fn keypair<R: RngCore>(rng: &mut R) -> (Self::Scalar, Self::G1) {
        let secret = P::Scalar::rand(rng);
        let public = Self::public_key(&secret);
        (secret, public)
    }

    fn public_key(secret: &Self::Scalar) -> Self::G1 {
        let mut public = P::G1::one();
        public.mul(secret);
        public
    }

    fn is_valid_key(public: &Self::G1) -> bool {
        !public.is_identity()
    }

    fn generate_contribution<R: RngCore>(
        dealer: ParticipantId,
        recipients: &[(ParticipantId, Self::G1)],
        threshold: usize,
        rng: &mut R,
    ) -> Result<Contribution<Self>, VssError> {
        if threshold == 0 || threshold > recipients.len() {
            return Err(VssError::InvalidThreshold(threshold, recipients.len()));
        }

        let secret = Poly::<P::Scalar>::new_from(threshold - 1, rng);
        let g1: Vec<P::G1> = secret.commit::<P::G1>().into();
        let g2: Vec<P::G2> = secret.commit::<P::G2>().into();

        let shares = recipients
            .iter()
            .map(|(id, key)| {
                // evaluate the secret polynomial at the recipient's id
                let eval = secret.eval(*id);
                let buff = bincode::serialize(&eval.value)?;
                let ciphertext = ecies::encrypt::<G1Curve<P>, _>(key, &buff, rng)?;

                Ok(EncryptedShare {
                    from: dealer,
                    to: *id,
                    ciphertext,
                })
            })
            .collect::<Result<Vec<_>, VssError>>()?;

        Ok(Contribution {
            coefficients: secret.into(),
            commitment: PolynomialCommitment {
                owner: dealer,
                g1,
                g2,
            },
            shares,
        })
    }

    fn verify_share(
        commitment: &PolynomialCommitment<Self>,
        recipient: ParticipantId,
        share: &Self::Scalar,
    ) -> FeldmanCheck {
        FeldmanCheck {
            g1: share_correct::<P::G1>(recipient, share, &commitment.g1),
            g2: share_correct::<P::G2>(recipient, share, &commitment.g2),
        }
    }

    fn verify_public_commitment(commitment: &PolynomialCommitment<Self>) -> bool {
        if commitment.g1.len() != commitment.g2.len() || commitment.g1.is_empty() {
            return false;
        }

        let g1 = P::G1::one();
        let g2 = P::G2::one();
        commitment
            .g1
            .iter()
            .zip(&commitment.g2)
            .all(|(c1, c2)| P::pair(c1, &g2) == P::pair(&g1, c2))
    }

    fn decrypt_share(
        secret: &Self::Scalar,
        ciphertext: &Self::Ciphertext,
    ) -> Result<Self::Scalar, VssError> {
        let buff = ecies::decrypt::<G1Curve<P>>(secret, ciphertext)?;
        Ok(bincode::deserialize(&buff)?)
    }

    fn group_public_key<'a, I>(commitments: I) -> Self::G2
    where
        I: IntoIterator<Item = &'a PolynomialCommitment<Self>>,
    {
        commitments
            .into_iter()
            .filter_map(|c| c.g2.first())
            .fold(P::G2::zero(), |mut acc, free| {
                acc.add(free);
                acc
            })
    }

    fn member_public_key<'a, I>(commitments: I, id: ParticipantId) -> Self::G2
    where
        I: IntoIterator<Item = &'a PolynomialCommitment<Self>>,
    {
        commitments
            .into_iter()
            .map(|c| Poly::from(c.g2.clone()).eval(id).value)
            .fold(P::G2::zero(), |mut acc, eval| {
                acc.add(&eval);
                acc
            })
    }

    fn combine_shares(shares: &[Self::Scalar]) -> Self::Scalar {
        shares.iter().fold(P::Scalar::zero(), |mut acc, share| {
            acc.add(share);
            acc
        })
    }
}

/// Checks if the commitment to the share corresponds to the public polynomial
/// evaluated at the given point.
fn share_correct<G>(idx: ParticipantId, share: &G::RHS, public: &[G]) -> bool
where
    G: Element,
    G::RHS: Scalar<RHS = G::RHS>,
{
    if public.is_empty() {
        return false;
    }

    let mut commit = G::one();
    commit.mul(share);
    let pub_eval = Poly::from(public.to_vec()).eval(idx);
    pub_eval.value == commit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{keys, TestVss};
    use threshold_vss::{
        curve::bn254::{Scalar, G1, G2},
        group::Scalar as _,
        poly::Eval,
    };

    #[test]
    fn shares_verify_against_both_commitments() {
        let rng = &mut rand::thread_rng();
        let (secrets, recipients) = keys(5, rng);
        let contribution = TestVss::generate_contribution(1, &recipients, 3, rng).unwrap();

        assert_eq!(contribution.commitment.g1.len(), 3);
        assert_eq!(contribution.commitment.g2.len(), 3);
        assert_eq!(contribution.shares.len(), 5);
        assert!(TestVss::verify_public_commitment(&contribution.commitment));

        for (share, secret) in contribution.shares.iter().zip(&secrets) {
            let clear = TestVss::decrypt_share(secret, &share.ciphertext).unwrap();
            let check = TestVss::verify_share(&contribution.commitment, share.to, &clear);
            assert!(check.is_valid());

            // the share does not verify at another index
            let other = share.to % 5 + 1;
            let check = TestVss::verify_share(&contribution.commitment, other, &clear);
            assert_eq!(check, FeldmanCheck { g1: false, g2: false });
        }
    }

    #[test]
    fn detects_inconsistent_groups() {
        let rng = &mut rand::thread_rng();
        let (secrets, recipients) = keys(3, rng);
        let mut contribution = TestVss::generate_contribution(1, &recipients, 2, rng).unwrap();

        // swap the G2 commitment with another polynomial's one
        contribution.commitment.g2[1] = G2::rand(rng);
        assert!(!TestVss::verify_public_commitment(&contribution.commitment));

        let clear = TestVss::decrypt_share(&secrets[0], &contribution.shares[0].ciphertext).unwrap();
        let check = TestVss::verify_share(&contribution.commitment, 1, &clear);
        assert_eq!(check, FeldmanCheck { g1: true, g2: false });
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let rng = &mut rand::thread_rng();
        let (secrets, recipients) = keys(2, rng);
        let contribution = TestVss::generate_contribution(1, &recipients, 1, rng).unwrap();
        TestVss::decrypt_share(&secrets[1], &contribution.shares[0].ciphertext).unwrap_err();
    }

    #[test]
    fn rejects_invalid_thresholds() {
        let rng = &mut rand::thread_rng();
        let (_, recipients) = keys(2, rng);
        assert!(matches!(
            TestVss::generate_contribution(1, &recipients, 3, rng).unwrap_err(),
            VssError::InvalidThreshold(3, 2)
        ));
        assert!(matches!(
            TestVss::generate_contribution(1, &recipients, 0, rng).unwrap_err(),
            VssError::InvalidThreshold(0, 2)
        ));
    }

    #[test]
    fn group_and_member_keys() {
        let (n, t) = (4, 3);
        let rng = &mut rand::thread_rng();
        let (secrets, recipients) = keys(n, rng);
        let contributions = (1..=n as ParticipantId)
            .map(|dealer| TestVss::generate_contribution(dealer, &recipients, t, rng).unwrap())
            .collect::<Vec<_>>();
        let commitments = contributions.iter().map(|c| &c.commitment);

        // the group secret is the sum of the free coefficients
        let group_secret = TestVss::combine_shares(
            &contributions
                .iter()
                .map(|c| c.coefficients[0])
                .collect::<Vec<_>>(),
        );
        let mut expected = G2::one();
        expected.mul(&group_secret);
        assert_eq!(TestVss::group_public_key(commitments.clone()), expected);

        let mut evals = Vec::new();
        for (i, secret) in secrets.iter().enumerate() {
            let id = i as ParticipantId + 1;
            let received = contributions
                .iter()
                .map(|c| TestVss::decrypt_share(secret, &c.shares[i].ciphertext).unwrap())
                .collect::<Vec<Scalar>>();
            let share = TestVss::combine_shares(&received);

            let mut public = G2::one();
            public.mul(&share);
            assert_eq!(TestVss::member_public_key(commitments.clone(), id), public);

            evals.push(Eval {
                value: share,
                index: id,
            });
        }

        // any t combined shares recover the group secret
        let recovered = Poly::<Scalar>::recover(t, evals[1..].to_vec()).unwrap();
        assert_eq!(recovered, group_secret);
    }

    #[test]
    fn public_key_matches_keypair() {
        let rng = &mut rand::thread_rng();
        let (secret, public) = TestVss::keypair(rng);
        assert_eq!(TestVss::public_key(&secret), public);
        assert_ne!(TestVss::public_key(&Scalar::from_u64(1)), public);
        assert_eq!(TestVss::public_key(&Scalar::from_u64(1)), G1::one());
    }
}
