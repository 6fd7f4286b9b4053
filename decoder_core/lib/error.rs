use thiserror::Error;

/// Failures surfaced by the decoding core. Both variants are synchronous and
/// never transient: `InvalidArgument` means the decode loop passed malformed
/// shapes or parameters, `FailedPrecondition` means session state (history,
/// cursor) was corrupted and the session should not continue.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
}

impl DecodeError {
    pub(crate) fn invalid_arg(msg: impl Into<String>) -> Self {
        DecodeError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
