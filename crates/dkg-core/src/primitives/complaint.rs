use super::types::{
    BlockNumber, EncryptedShare, FeldmanCheck, ParticipantId, PolynomialCommitment,
};
use crate::vss::VssProvider;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintOutcome {
    Pending,
    /// The accused dealt an inconsistent share and loses its deposit
    Justified,
    /// The share was consistent, the complainer loses its deposit
    Unjustified,
}

/// Why a complaint was resolved the way it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evidence {
    /// The share could not be decrypted with the complainer's key
    Undecryptable,
    /// Result of checking the decrypted share in each group
    Feldman(FeldmanCheck),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub complainer: ParticipantId,
    pub accused: ParticipantId,
    pub outcome: ComplaintOutcome,
    pub evidence: Option<Evidence>,
    /// The block the complaint was filed at
    pub filed_at: BlockNumber,
}

impl ComplaintRecord {
    pub fn new(complainer: ParticipantId, accused: ParticipantId, filed_at: BlockNumber) -> Self {
        Self {
            complainer,
            accused,
            outcome: ComplaintOutcome::Pending,
            evidence: None,
            filed_at,
        }
    }

    /// Resolves a pending complaint. `share` must be the accused's share to the
    /// complainer and `commitment` the accused's commitment.
    pub fn resolve<V: VssProvider>(
        &mut self,
        commitment: &PolynomialCommitment<V>,
        share: &EncryptedShare<V>,
        secret_key: &V::Scalar,
    ) -> ComplaintOutcome {
        let evidence = check_share::<V>(commitment, share, self.complainer, secret_key);
        self.outcome = match evidence {
            Evidence::Feldman(check) if check.is_valid() => ComplaintOutcome::Unjustified,
            _ => ComplaintOutcome::Justified,
        };
        self.evidence = Some(evidence);

        debug!(
            complainer = self.complainer,
            accused = self.accused,
            ?evidence,
            outcome = ?self.outcome,
            "complaint resolved"
        );

        self.outcome
    }
}

fn check_share<V: VssProvider>(
    commitment: &PolynomialCommitment<V>,
    share: &EncryptedShare<V>,
    recipient: ParticipantId,
    secret_key: &V::Scalar,
) -> Evidence {
    match V::decrypt_share(secret_key, &share.ciphertext) {
        Ok(clear) => Evidence::Feldman(V::verify_share(commitment, recipient, &clear)),
        Err(_) => Evidence::Undecryptable,
    }
}

/// The verdict a participant reaches locally on a dealer's share, before
/// deciding whether to complain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVerdict {
    pub evidence: Evidence,
    /// Whether the dealer's G1 and G2 commitments commit to the same polynomial
    pub commitments_consistent: bool,
}

impl LocalVerdict {
    /// A complaint filed on this share would be justified
    pub fn should_complain(&self) -> bool {
        !matches!(self.evidence, Evidence::Feldman(check) if check.is_valid())
    }
}

/// Runs the arbiter's check off-ledger, plus a pairing check of the dealer's
/// commitments.
pub fn verify_private_commitment<V: VssProvider>(
    commitment: &PolynomialCommitment<V>,
    share: &EncryptedShare<V>,
    recipient: ParticipantId,
    secret_key: &V::Scalar,
) -> LocalVerdict {
    LocalVerdict {
        evidence: check_share::<V>(commitment, share, recipient, secret_key),
        commitments_consistent: V::verify_public_commitment(commitment),
    }
}
