use super::types::BlockNumber;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The authoritative phase of a DKG instance.
///
/// ```text
/// Enrollment -> Commit -> PostCommit -> EndSuccess
///     |           |           |
///     +-----------+-----------+-------> EndFail
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Enrollment,
    Commit,
    PostCommit,
    EndSuccess,
    EndFail,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::EndSuccess | Phase::EndFail)
    }

    /// Returns true if `next` directly follows this phase
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Enrollment, Commit)
                | (Enrollment, EndFail)
                | (Commit, PostCommit)
                | (Commit, EndFail)
                | (PostCommit, EndSuccess)
                | (PostCommit, EndFail)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Holds the current phase together with the block at which it was entered.
/// Phases only move forward.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: Phase,
    entered_at: BlockNumber,
    history: Vec<(Phase, BlockNumber)>,
}

impl PhaseMachine {
    pub fn new(now: BlockNumber) -> Self {
        Self {
            current: Phase::Enrollment,
            entered_at: now,
            history: vec![(Phase::Enrollment, now)],
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    /// The block at which the current phase was entered
    pub fn entered_at(&self) -> BlockNumber {
        self.entered_at
    }

    /// Every phase entered so far, with its block
    pub fn history(&self) -> &[(Phase, BlockNumber)] {
        &self.history
    }

    /// Blocks spent in the current phase
    pub fn elapsed(&self, now: BlockNumber) -> BlockNumber {
        now.saturating_sub(self.entered_at)
    }

    pub(crate) fn advance(&mut self, next: Phase, now: BlockNumber) -> Result<(), InvalidTransition> {
        if !self.current.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }

        self.current = next;
        self.entered_at = now;
        self.history.push((next, now));
        Ok(())
    }
}
