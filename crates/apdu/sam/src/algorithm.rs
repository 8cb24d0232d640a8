//! Cryptographic algorithms supported by the SAM operations

use derive_more::Display;

use crate::{
    Error,
    constants::{AES_FRAME_CEILING, DES_FRAME_CEILING},
};

/// Algorithm of the key entry used by an operation
///
/// All algorithm-dependent parameters live in this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u8)]
pub enum CryptoAlgorithm {
    /// DES, 2K3DES or 3K3DES
    #[display("DES")]
    Des = 0x00,
    /// AES-128
    #[display("AES")]
    Aes = 0x01,
}

impl CryptoAlgorithm {
    /// Cipher block size in bytes
    pub const fn block_size(self) -> usize {
        match self {
            Self::Des => 8,
            Self::Aes => 16,
        }
    }

    /// Largest payload carried by a single frame
    pub const fn frame_ceiling(self) -> usize {
        match self {
            Self::Des => DES_FRAME_CEILING,
            Self::Aes => AES_FRAME_CEILING,
        }
    }

    /// Length of the initialization vector
    pub const fn iv_size(self) -> usize {
        self.block_size()
    }
}

impl TryFrom<u8> for CryptoAlgorithm {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Error> {
        match tag {
            0x00 => Ok(Self::Des),
            0x01 => Ok(Self::Aes),
            _ => Err(Error::InvalidAlgorithm(tag)),
        }
    }
}

impl From<CryptoAlgorithm> for u8 {
    fn from(algorithm: CryptoAlgorithm) -> Self {
        algorithm as Self
    }
}
