//! Error types specific to APDU commands

use thiserror::Error;

/// Error for APDU command encoding and parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Raw bytes do not form a short APDU
    #[error("Malformed command of {0} bytes")]
    InvalidLength(usize),

    /// Payload does not fit a single short APDU
    #[error("Command data of {length} bytes exceeds {max}")]
    DataTooLong {
        /// Payload length
        length: usize,
        /// Largest payload a short APDU carries
        max: usize,
    },
}
