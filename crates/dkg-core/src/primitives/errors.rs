use super::{
    phase::Phase,
    types::{Amount, BlockNumber, ParticipantId},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use threshold_vss::encoding::EncodingError;

/// Result type alias which returns `DKGError`
pub type DKGResult<A> = Result<A, DKGError>;

/// The error taxonomy shared by the arbiter, the ledger and the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state mutation
    Validation,
    /// Operation not permitted in the current phase, nothing was mutated
    PhaseViolation,
    /// The instance ended in a way the caller cannot recover from
    ProtocolFailure,
    /// The caller must wait for more blocks and retry
    TimeoutNotElapsed,
    /// The ledger or the VSS provider is unavailable
    Resource,
}

/// The arbiter operation which was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Enroll,
    SubmitCommitment,
    FileComplaint,
    Finalize,
    Expire,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Operation::Enroll => "enroll",
            Operation::SubmitCommitment => "commit",
            Operation::FileComplaint => "complaint",
            Operation::Finalize => "finalize",
            Operation::Expire => "expire",
        };
        f.write_str(s)
    }
}

/// Ways in which a submitted commitment can be malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformation {
    #[error("G1 commitment has {0} points, expected {1}")]
    G1Length(usize, usize),
    #[error("G2 commitment has {0} points, expected {1}")]
    G2Length(usize, usize),
    #[error("got {0} encrypted shares, expected {1}")]
    ShareCount(usize, usize),
    /// The shares are not exactly one per recipient, all from the submitter
    #[error("share from {from} to {to} is misaddressed")]
    Misaddressed {
        from: ParticipantId,
        to: ParticipantId,
    },
    #[error("undecodable calldata: {0}")]
    Encoding(#[from] EncodingError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reason {
    #[error("deposit {provided} is below the required {required}")]
    InsufficientDeposit { provided: Amount, required: Amount },

    #[error("account is already enrolled")]
    AlreadyEnrolled,

    #[error("the identity point is not a valid encryption key")]
    IdentityKey,

    /// DepositOverflow is raised when the escrowed total would no longer fit
    /// in an `Amount`
    #[error("deposit {0} cannot be held in escrow")]
    DepositOverflow(Amount),

    /// RegistrationClosed is raised when enrolling outside of `Enrollment` or
    /// once every slot has been taken
    #[error("registration is closed")]
    RegistrationClosed,

    #[error("participant is not enrolled")]
    NotEnrolled,

    #[error("unknown participant")]
    UnknownParticipant,

    /// SenderMismatch is raised when an account acts on behalf of an id it
    /// did not enroll
    #[error("sender does not own the participant id")]
    SenderMismatch,

    #[error("malformed commitment: {0}")]
    MalformedCommitment(Malformation),

    #[error("malformed key: {0}")]
    MalformedKey(EncodingError),

    #[error("commitment was already submitted")]
    DuplicateSubmission,

    #[error("participants cannot complain against themselves")]
    SelfComplaint,

    /// SecretKeyMismatch is raised when the revealed secret key does not
    /// correspond to the complainer's registered public key. Accepting it would
    /// let a complainer frame an honest dealer.
    #[error("revealed secret key does not match the registered public key")]
    SecretKeyMismatch,

    #[error("accused participant has not committed")]
    NoCommitment,

    #[error("not allowed in phase {0}")]
    WrongPhase(Phase),

    #[error("a complaint was already resolved")]
    ComplaintAlreadyResolved,

    #[error("{remaining} more block(s) required")]
    TimeoutNotElapsed { remaining: BlockNumber },
}

impl Reason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Reason::RegistrationClosed | Reason::WrongPhase(_) | Reason::ComplaintAlreadyResolved => {
                ErrorKind::PhaseViolation
            }
            Reason::TimeoutNotElapsed { .. } => ErrorKind::TimeoutNotElapsed,
            _ => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// An operation rejected by the arbiter, with enough context to audit it
#[error("{operation} rejected in phase {phase} (participants: {participants:?}): {reason}")]
pub struct DKGError {
    pub operation: Operation,
    /// The phase at the time of the rejection
    pub phase: Phase,
    /// The ids involved, when they are known
    pub participants: Vec<ParticipantId>,
    pub reason: Reason,
}

impl DKGError {
    pub fn new(operation: Operation, phase: Phase, reason: Reason) -> Self {
        Self {
            operation,
            phase,
            participants: Vec::new(),
            reason,
        }
    }

    /// Attaches the ids of the participants involved
    pub fn involving(mut self, ids: &[ParticipantId]) -> Self {
        self.participants.extend_from_slice(ids);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.reason.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let err = |reason| DKGError::new(Operation::Finalize, Phase::Commit, reason);
        assert_eq!(
            err(Reason::WrongPhase(Phase::Commit)).kind(),
            ErrorKind::PhaseViolation
        );
        assert_eq!(
            err(Reason::TimeoutNotElapsed { remaining: 3 }).kind(),
            ErrorKind::TimeoutNotElapsed
        );
        assert_eq!(
            err(Reason::MalformedCommitment(Malformation::G1Length(1, 2))).kind(),
            ErrorKind::Validation
        );
        assert_eq!(err(Reason::DuplicateSubmission).kind(), ErrorKind::Validation);
    }

    #[test]
    fn display_carries_context() {
        let err = DKGError::new(
            Operation::SubmitCommitment,
            Phase::Commit,
            Reason::DuplicateSubmission,
        )
        .involving(&[3]);
        assert_eq!(
            err.to_string(),
            "commit rejected in phase Commit (participants: [3]): commitment was already submitted"
        );
    }
}
