//! Error types for DESFire authentication and secure messaging

use nexum_apdu_core::{CommandError, ResponseError, StatusWord, TransportError};
use thiserror::Error;

use crate::auth::AuthState;

/// Result type for DESFire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for DESFire operations
///
/// Messages never carry key material, nonces or session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport-related errors, forwarded unmodified
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response-related errors
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Command-related errors
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The card answered with a status other than the one expected
    #[error("Card returned status {status}: {description}")]
    ProtocolStatus {
        /// Raw status word
        status: StatusWord,
        /// Decoded meaning, when known
        description: &'static str,
    },

    /// Response of unexpected length or structure
    #[error("Malformed response ({reason}): {length} bytes")]
    MalformedResponse {
        /// What was wrong with the response
        reason: &'static str,
        /// Length of the offending data
        length: usize,
    },

    /// The card did not prove knowledge of the key
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// A secure messaging operation was attempted without a session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The command counter reached its limit
    #[error("Command counter exhausted, re-authentication required")]
    CounterExhausted,

    /// A MAC or CRC did not match the received data
    #[error("Integrity check failed: {0}")]
    IntegrityError(&'static str),

    /// Key of the wrong size for the selected key type
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Handshake step called out of order
    #[error("Handshake cannot {action} in state {state}")]
    InvalidState {
        /// Current handshake state
        state: AuthState,
        /// Step that was attempted
        action: &'static str,
    },

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(&'static str),
}

impl Error {
    /// Create a protocol status error from a status word
    pub const fn status(status: StatusWord) -> Self {
        Self::ProtocolStatus {
            status,
            description: status.description(),
        }
    }

    /// Create a malformed response error
    pub const fn malformed(reason: &'static str, length: usize) -> Self {
        Self::MalformedResponse { reason, length }
    }
}
