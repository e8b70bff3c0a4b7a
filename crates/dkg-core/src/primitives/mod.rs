/// Protocol parameters and their defaults
pub(crate) mod config;
pub use config::*;

pub(crate) mod types;
pub use types::*;

mod errors;
pub use errors::{DKGError, DKGResult, ErrorKind, Malformation, Operation, Reason};

/// The phases of an instance and the transitions between them
pub(crate) mod phase;
pub use phase::{InvalidTransition, Phase, PhaseMachine};

pub(crate) mod registry;
pub use registry::Registry;

/// Append-only storage of the commitments and encrypted shares
pub(crate) mod commitments;
pub use commitments::CommitmentLedger;

pub(crate) mod complaint;
pub use complaint::{
    verify_private_commitment, ComplaintOutcome, ComplaintRecord, Evidence, LocalVerdict,
};

pub(crate) mod escrow;
pub use escrow::{Escrow, Settlement};

/// The authority which owns the state of an instance
pub(crate) mod arbiter;
pub use arbiter::{Arbiter, Event};
