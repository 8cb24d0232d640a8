//! Error types for SAM AV2 operations

use bytes::Bytes;
use nexum_apdu_core::{CommandError, StatusWord, TransportError};
use thiserror::Error;

use crate::{algorithm::CryptoAlgorithm, commands::SamOperation};

/// Result type for SAM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for SAM operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport-related errors, forwarded unmodified
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Command-related errors
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A frame was answered with an unexpected status
    ///
    /// `partial` holds the output of the frames that completed before the
    /// failing one.
    #[error(
        "SAM returned status {status}: {description} ({} bytes received before failure)",
        .partial.len()
    )]
    Status {
        /// Raw status word
        status: StatusWord,
        /// Decoded meaning, when known
        description: &'static str,
        /// Output accumulated so far
        partial: Bytes,
    },

    /// Response shorter than a status word
    #[error("Malformed response: {length} bytes")]
    MalformedResponse {
        /// Length of the response
        length: usize,
    },

    /// Algorithm tag outside the supported table
    #[error("Unsupported algorithm tag {0:#04x}")]
    InvalidAlgorithm(u8),

    /// Input length does not meet the operation's precondition
    #[error("Invalid input length {length} for {operation} with {algorithm}")]
    InvalidLength {
        /// Requested operation
        operation: SamOperation,
        /// Selected algorithm
        algorithm: CryptoAlgorithm,
        /// Offending length
        length: usize,
    },

    /// Operation not implemented by this crate
    #[error("{0} is not supported")]
    NotSupported(SamOperation),
}

impl Error {
    /// Create a status error carrying the partial output
    pub const fn status(status: StatusWord, partial: Bytes) -> Self {
        Self::Status {
            status,
            description: status.description(),
            partial,
        }
    }
}
