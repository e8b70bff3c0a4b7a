pub mod actions;
pub mod opts;

use dkg_core::primitives::ParticipantId;
use thiserror::Error;
use threshold_vss::encoding::EncodingError;

pub type CLIResult<T> = std::result::Result<T, CLIError>;

#[derive(Debug, Error)]
pub enum CLIError {
    #[error("{0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    JsonError(#[from] serde_json::Error),
    #[error("{0}")]
    HexError(#[from] hex::FromHexError),
    #[error("{0}")]
    EncodingError(#[from] EncodingError),
    #[error("no commitment was published by participant {0}")]
    MissingRecord(ParticipantId),
    #[error("participant {from} published no share for participant {to}")]
    MissingShare {
        from: ParticipantId,
        to: ParticipantId,
    },
    #[error("unknown complaint policy `{0}`, expected `close` or `continue`")]
    InvalidPolicy(String),
}
