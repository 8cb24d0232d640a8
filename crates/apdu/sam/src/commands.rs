//! SAM command frames
//!
//! Chained operations are sent as `80 INS P1 P2 Lc data [Le]` where P1 is
//! `AF` while more frames follow and `00` on the last one.

use derive_more::Display;
use nexum_apdu_core::Command;

use crate::{
    Error, Result,
    algorithm::CryptoAlgorithm,
    constants::{MIN_DECIPHER_OFFLINE_LENGTH, ONLINE_BLOCK_SIZE, cla, ins, p1, p2},
    fragment::{Fragment, fragment},
};

/// Chained cryptographic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SamOperation {
    /// Encipher with the card session key
    #[display("EncipherData")]
    EncipherData,
    /// Decipher with the card session key
    #[display("DecipherData")]
    DecipherData,
    /// Encipher with the offline crypto key
    #[display("EncipherOfflineData")]
    EncipherOfflineData,
    /// Decipher with the offline crypto key
    #[display("DecipherOfflineData")]
    DecipherOfflineData,
    /// MAC with the selected key entry
    #[display("GenerateMac")]
    GenerateMac,
}

impl SamOperation {
    /// Instruction code
    pub const fn instruction(self) -> u8 {
        match self {
            Self::EncipherData => ins::ENCIPHER_DATA,
            Self::DecipherData => ins::DECIPHER_DATA,
            Self::EncipherOfflineData => ins::ENCIPHER_OFFLINE_DATA,
            Self::DecipherOfflineData => ins::DECIPHER_OFFLINE_DATA,
            Self::GenerateMac => ins::GENERATE_MAC,
        }
    }

    /// P2 parameter
    pub const fn p2(self) -> u8 {
        match self {
            Self::GenerateMac => p2::GENERATE_MAC,
            _ => p2::NONE,
        }
    }

    /// Check the input length precondition
    ///
    /// Online encipher requires a multiple of 8 for every algorithm, the
    /// offline variants a multiple of the algorithm's block size.
    pub const fn check_length(self, algorithm: CryptoAlgorithm, length: usize) -> Result<()> {
        let valid = match self {
            Self::EncipherData | Self::DecipherData => length % ONLINE_BLOCK_SIZE == 0,
            Self::EncipherOfflineData => length % algorithm.block_size() == 0,
            Self::DecipherOfflineData => {
                length % algorithm.block_size() == 0 && length >= MIN_DECIPHER_OFFLINE_LENGTH
            }
            Self::GenerateMac => true,
        };

        if !valid {
            return Err(Error::InvalidLength {
                operation: self,
                algorithm,
                length,
            });
        }
        Ok(())
    }

    /// Build the frame carrying `fragment`
    ///
    /// GenerateMac omits Le on every frame but the last.
    pub fn frame(self, fragment: &Fragment) -> Result<Command> {
        let marker = if fragment.last {
            p1::LAST_FRAME
        } else {
            p1::MORE_DATA
        };
        let command = Command::try_new_with_data(
            cla::SAM,
            self.instruction(),
            marker,
            self.p2(),
            fragment.data.clone(),
        )?;

        if fragment.last || self != Self::GenerateMac {
            Ok(command.with_le(0x00))
        } else {
            Ok(command)
        }
    }
}

/// Validate an operation and build all of its frames
///
/// Fails before producing any frame when the operation is not supported or
/// the input does not meet its length precondition.
pub fn plan(
    operation: SamOperation,
    algorithm: CryptoAlgorithm,
    data: &[u8],
) -> Result<Vec<Command>> {
    if operation == SamOperation::DecipherData {
        return Err(Error::NotSupported(operation));
    }
    operation.check_length(algorithm, data.len())?;

    fragment(data, algorithm.frame_ceiling())
        .iter()
        .map(|f| operation.frame(f))
        .collect()
}

/// SAM_LoadInitVector frame
///
/// The IV is zero-padded or truncated to the algorithm's IV size. No Le is
/// sent.
pub fn load_init_vector(algorithm: CryptoAlgorithm, iv: &[u8]) -> Command {
    let mut data = iv[..iv.len().min(algorithm.iv_size())].to_vec();
    data.resize(algorithm.iv_size(), 0x00);
    Command::new_with_data(cla::SAM, ins::LOAD_INIT_VECTOR, 0x00, 0x00, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use nexum_apdu_core::ApduCommand;

    #[test]
    fn test_plan_chaining_markers() {
        let frames =
            plan(SamOperation::EncipherOfflineData, CryptoAlgorithm::Aes, &[0u8; 512]).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.p1).collect::<Vec<_>>(),
            [p1::MORE_DATA, p1::MORE_DATA, p1::LAST_FRAME]
        );
        assert!(frames.iter().all(|f| f.le == Some(0x00)));
        assert_eq!(frames[0].data.as_ref().unwrap().len(), 240);
        assert_eq!(frames[2].data.as_ref().unwrap().len(), 32);
    }

    #[test]
    fn test_generate_mac_le_only_on_last_frame() {
        let frames = plan(SamOperation::GenerateMac, CryptoAlgorithm::Des, &[0x11u8; 300]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].p2, 0x10);
        assert_eq!(frames[0].le, None);
        assert_eq!(frames[1].le, Some(0x00));
        assert_eq!(frames[1].data.as_ref().unwrap().len(), 52);
    }

    #[test]
    fn test_encipher_data_frame() {
        let frames = plan(
            SamOperation::EncipherData,
            CryptoAlgorithm::Aes,
            &hex!("0001020304050607"),
        )
        .unwrap();
        assert_eq!(
            frames[0].to_bytes().as_ref(),
            hex!("80 ED 00 00 08 0001020304050607 00")
        );
    }

    #[test]
    fn test_length_preconditions() {
        // Online encipher only requires 8-byte granularity, even for AES
        assert!(plan(SamOperation::EncipherData, CryptoAlgorithm::Aes, &[0u8; 24]).is_ok());
        assert_eq!(
            plan(SamOperation::EncipherData, CryptoAlgorithm::Des, &[0u8; 12]).err(),
            Some(Error::InvalidLength {
                operation: SamOperation::EncipherData,
                algorithm: CryptoAlgorithm::Des,
                length: 12,
            })
        );
        assert!(plan(SamOperation::EncipherOfflineData, CryptoAlgorithm::Aes, &[0u8; 24]).is_err());
        assert!(plan(SamOperation::EncipherOfflineData, CryptoAlgorithm::Des, &[0u8; 24]).is_ok());
        assert!(plan(SamOperation::DecipherOfflineData, CryptoAlgorithm::Des, &[]).is_err());
        assert!(plan(SamOperation::GenerateMac, CryptoAlgorithm::Aes, &[0u8; 5]).is_ok());
    }

    #[test]
    fn test_decipher_data_not_supported() {
        assert_eq!(
            plan(SamOperation::DecipherData, CryptoAlgorithm::Aes, &[0u8; 16]).err(),
            Some(Error::NotSupported(SamOperation::DecipherData))
        );
    }

    #[test]
    fn test_load_init_vector() {
        let cmd = load_init_vector(CryptoAlgorithm::Des, &hex!("0102030405"));
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80 71 00 00 08 0102030405 000000"));

        let cmd = load_init_vector(CryptoAlgorithm::Aes, &[0xFFu8; 20]);
        assert_eq!(cmd.data.as_ref().unwrap().as_ref(), [0xFFu8; 16]);
        assert_eq!(cmd.le, None);
    }
}
