use crate::vss::VssProvider;

use serde::{Deserialize, Serialize};
use std::fmt;
use threshold_vss::poly::Idx;

/// 1-based index assigned to a participant in join order
pub type ParticipantId = Idx;

/// Height of the ledger
pub type BlockNumber = u64;

/// Deposits and balances, in the ledger's smallest unit
pub type Amount = u128;

/// Observational cost of a ledger transaction
pub type Gas = u64;

/// The ledger account a participant sends its transactions from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountHandle(String);

impl AccountHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountHandle {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An enrolled participant, as seen by the arbiter.
#[derive(Clone, Debug)]
pub struct Participant<V: VssProvider> {
    /// The participant's index, never reused
    pub id: ParticipantId,
    /// The account which enrolled
    pub account: AccountHandle,
    /// The key shares addressed to this participant are encrypted to
    pub public_key: V::G1,
    /// The amount held in escrow
    pub deposit: Amount,
    /// Whether the participant's commitment was accepted
    pub committed: bool,
    /// Gas spent by all of the participant's transactions
    pub gas_spent: Gas,
}

/// The public part of a dealer's secret polynomial, committed in both groups.
/// `g1[k]` and `g2[k]` both commit to the `k`-th coefficient.
#[derive(Clone, Debug)]
pub struct PolynomialCommitment<V: VssProvider> {
    /// The dealer
    pub owner: ParticipantId,
    /// Commitment in G1, `threshold` points
    pub g1: Vec<V::G1>,
    /// Commitment in G2, `threshold` points
    pub g2: Vec<V::G2>,
}

/// EncryptedShare holds the encryption of the evaluation of `from`'s secret
/// polynomial at `to`, under `to`'s public key.
#[derive(Clone, Debug)]
pub struct EncryptedShare<V: VssProvider> {
    /// The dealer
    pub from: ParticipantId,
    /// The recipient
    pub to: ParticipantId,
    pub ciphertext: V::Ciphertext,
}

// derive would bound `V: PartialEq`

impl<V: VssProvider> PartialEq for PolynomialCommitment<V> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.g1 == other.g1 && self.g2 == other.g2
    }
}

impl<V: VssProvider> PartialEq for EncryptedShare<V> {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to && self.ciphertext == other.ciphertext
    }
}

/// Everything a dealer produces off-ledger. Only `commitment` and `shares`
/// are ever published.
#[derive(Clone, Debug)]
pub struct Contribution<V: VssProvider> {
    /// The secret polynomial's coefficients, constant term first
    pub coefficients: Vec<V::Scalar>,
    pub commitment: PolynomialCommitment<V>,
    /// One share per recipient, ordered by recipient id
    pub shares: Vec<EncryptedShare<V>>,
}

/// Result of checking a share against a commitment in each group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeldmanCheck {
    pub g1: bool,
    pub g2: bool,
}

impl FeldmanCheck {
    /// True when the share is consistent in both groups
    pub fn is_valid(&self) -> bool {
        self.g1 && self.g2
    }
}
