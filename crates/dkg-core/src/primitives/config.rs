use super::types::{Amount, BlockNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Participants in the reference deployment
pub const DEFAULT_PARTICIPANT_COUNT: usize = 22;

/// Threshold in the reference deployment
pub const DEFAULT_THRESHOLD: usize = 14;

/// 25 ether, expressed in wei
pub const DEFAULT_DEPOSIT: Amount = 25_000_000_000_000_000_000;

/// Blocks which must be mined after the last commitment before the DKG can be finalized
pub const DEFAULT_CHALLENGE_WINDOW: BlockNumber = 11;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one participant is required")]
    NoParticipants,
    #[error("threshold {0} is not in range [1,{1}]")]
    InvalidThreshold(usize, usize),
    #[error("{0} participants cannot be indexed")]
    TooManyParticipants(usize),
}

/// What happens to the DKG when a complaint turns out to be unjustified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintPolicy {
    /// Any resolved complaint terminates the DKG in `EndFail`
    CloseOnAnyComplaint,
    /// An unjustified complaint only punishes the complainer and the DKG may
    /// still succeed.
    ///
    /// Only one complaint is ever accepted, so under this policy an accomplice
    /// of a bad dealer can take the slot with a deliberately unjustified
    /// complaint, sacrificing its deposit, and the bad dealer is never
    /// accused.
    ContinueOnUnjustified,
}

impl Default for ComplaintPolicy {
    fn default() -> Self {
        ComplaintPolicy::CloseOnAnyComplaint
    }
}

/// Parameters of a single DKG instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// The number of participants which must enroll
    pub participant_count: usize,
    /// The number of shares required to reconstruct the secret
    pub threshold: usize,
    /// The deposit each participant must lock when enrolling
    pub deposit: Amount,
    /// Blocks between entering `PostCommit` and the earliest finalization
    pub challenge_window: BlockNumber,
    /// Blocks after which a registry which is still not full can be expired
    pub enrollment_timeout: Option<BlockNumber>,
    /// Blocks after which missing commitments can be expired
    pub commit_timeout: Option<BlockNumber>,
    pub complaint_policy: ComplaintPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            participant_count: DEFAULT_PARTICIPANT_COUNT,
            threshold: DEFAULT_THRESHOLD,
            deposit: DEFAULT_DEPOSIT,
            challenge_window: DEFAULT_CHALLENGE_WINDOW,
            enrollment_timeout: None,
            commit_timeout: None,
            complaint_policy: ComplaintPolicy::default(),
        }
    }
}

impl ProtocolConfig {
    /// Creates a config with the default deposit, window and policy
    pub fn new(participant_count: usize, threshold: usize) -> Self {
        Self {
            participant_count,
            threshold,
            ..Default::default()
        }
    }

    /// Checks that `1 <= threshold <= participant_count`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.participant_count == 0 {
            return Err(ConfigError::NoParticipants);
        }

        if self.participant_count > u32::MAX as usize {
            return Err(ConfigError::TooManyParticipants(self.participant_count));
        }

        if self.threshold == 0 || self.threshold > self.participant_count {
            return Err(ConfigError::InvalidThreshold(
                self.threshold,
                self.participant_count,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProtocolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.participant_count, 22);
        assert_eq!(config.threshold, 14);
        assert_eq!(config.challenge_window, 11);
        assert_eq!(config.complaint_policy, ComplaintPolicy::CloseOnAnyComplaint);
    }

    #[test]
    fn rejects_bad_thresholds() {
        assert_eq!(
            ProtocolConfig::new(5, 0).validate().unwrap_err(),
            ConfigError::InvalidThreshold(0, 5)
        );
        assert_eq!(
            ProtocolConfig::new(5, 6).validate().unwrap_err(),
            ConfigError::InvalidThreshold(6, 5)
        );
        assert_eq!(
            ProtocolConfig::new(0, 0).validate().unwrap_err(),
            ConfigError::NoParticipants
        );
        ProtocolConfig::new(5, 5).validate().unwrap();
        ProtocolConfig::new(1, 1).validate().unwrap();
    }
}
