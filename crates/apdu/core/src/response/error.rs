//! Error types specific to APDU responses

use thiserror::Error;

use super::status::StatusWord;

/// Error for APDU response processing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Fewer than the two status bytes were received
    #[error("Incomplete response: {length} bytes")]
    Incomplete {
        /// Number of bytes received
        length: usize,
    },

    /// The device answered with a non-success status word
    #[error("Status {status}: {}", status.description())]
    Status {
        /// Offending status word
        status: StatusWord,
    },
}

impl ResponseError {
    /// Status word carried by this error, if any
    pub const fn status(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Incomplete { .. } => None,
        }
    }
}

impl From<StatusWord> for ResponseError {
    fn from(status: StatusWord) -> Self {
        Self::Status { status }
    }
}
