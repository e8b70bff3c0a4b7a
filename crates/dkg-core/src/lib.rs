//! # DKG Core
//!
//! A (t, n) distributed key generation with Feldman verifiable secret sharing,
//! arbitrated by a ledger.
//!
//! Participants enroll with a deposit, then each of them publishes a
//! commitment to a secret polynomial in two groups together with one
//! encrypted share per participant. Shares are not checked when they are
//! published: during a challenge window any participant may reveal its key to
//! prove that a share it received is inconsistent, and whoever was wrong loses
//! its deposit. Once the window has passed without a complaint the group key
//! is the sum of the commitments' constant terms.
//!
//! The [`Arbiter`](primitives::Arbiter) holds the authoritative state, a
//! [`Ledger`] orders the transactions which reach it and the [`Orchestrator`]
//! drives every participant through the phases.

/// Low level primitives and datatypes of the arbitrated DKG
pub mod primitives;

/// The arithmetic seam used for dealing and verifying shares
mod vss;
pub use vss::{PairingVss, VssError, VssProvider};

/// Ledger trait and an in-memory implementation
mod ledger;
pub use ledger::{GasSchedule, InMemoryLedger, Ledger, LedgerError, Receipt};

/// Drives the participants of an instance through every phase
mod orchestrator;
pub use orchestrator::{
    GasReport, MemberOutput, Orchestrator, OrchestratorConfig, OrchestratorError, RetryPolicy,
    RunReport, Scenario, Stage,
};

#[cfg(test)]
mod test_helpers;
