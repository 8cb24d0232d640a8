//! SAM AV2 driver
//!
//! Sends chained cryptographic operations to a SAM and reassembles the
//! output. Frames are never retried: the SAM keeps chaining state between
//! frames, so an operation that fails midway has to be restarted from the
//! first frame.

use bytes::{Bytes, BytesMut};
use nexum_apdu_core::{ApduCommand, CardTransport, Command, Response, StatusClass};
use tracing::{debug, warn};

use crate::{
    Error, Result,
    algorithm::CryptoAlgorithm,
    commands::{self, SamOperation},
};

/// SAM driven through a transport
#[derive(Debug)]
pub struct Sam<T: CardTransport> {
    /// SAM transport
    transport: T,
}

impl<T: CardTransport> Sam<T> {
    /// Create a new SAM instance
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get a reference to the transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the instance and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Encipher data with the current card session key (SAM_EncipherData)
    pub fn encipher_data(&mut self, algorithm: CryptoAlgorithm, data: &[u8]) -> Result<Bytes> {
        self.run(SamOperation::EncipherData, algorithm, data)
    }

    /// Decipher data with the current card session key
    ///
    /// Not supported, always fails with [`Error::NotSupported`].
    pub fn decipher_data(&mut self, algorithm: CryptoAlgorithm, data: &[u8]) -> Result<Bytes> {
        self.run(SamOperation::DecipherData, algorithm, data)
    }

    /// Encipher data with the offline crypto key (SAM_EncipherOffline_Data)
    pub fn encipher_offline_data(
        &mut self,
        algorithm: CryptoAlgorithm,
        data: &[u8],
    ) -> Result<Bytes> {
        self.run(SamOperation::EncipherOfflineData, algorithm, data)
    }

    /// Decipher data with the offline crypto key (SAM_DecipherOffline_Data)
    pub fn decipher_offline_data(
        &mut self,
        algorithm: CryptoAlgorithm,
        data: &[u8],
    ) -> Result<Bytes> {
        self.run(SamOperation::DecipherOfflineData, algorithm, data)
    }

    /// Generate a MAC over data (SAM_GenerateMAC)
    pub fn generate_mac(&mut self, algorithm: CryptoAlgorithm, data: &[u8]) -> Result<Bytes> {
        self.run(SamOperation::GenerateMac, algorithm, data)
    }

    /// Load the IV used by the following operations (SAM_LoadInitVector)
    pub fn load_init_vector(&mut self, algorithm: CryptoAlgorithm, iv: &[u8]) -> Result<Bytes> {
        let command = commands::load_init_vector(algorithm, iv);
        let response = self.exchange(&command)?;
        if !response.is_success() {
            warn!(status = %response.status(), "LoadInitVector failed");
            return Err(Error::status(response.status(), Bytes::new()));
        }
        Ok(response.into_payload())
    }

    fn exchange(&mut self, command: &Command) -> Result<Response> {
        let raw = self.transport.transmit_raw(&command.to_bytes())?;
        Response::from_bytes(&raw).map_err(|_| Error::MalformedResponse { length: raw.len() })
    }

    fn run(
        &mut self,
        operation: SamOperation,
        algorithm: CryptoAlgorithm,
        data: &[u8],
    ) -> Result<Bytes> {
        let frames = commands::plan(operation, algorithm, data)?;
        debug!(
            %operation,
            %algorithm,
            length = data.len(),
            frames = frames.len(),
            "Starting SAM operation"
        );

        let mut output = BytesMut::new();
        let total = frames.len();
        for (index, frame) in frames.iter().enumerate() {
            let response = self.exchange(frame)?;
            let expected = if index + 1 == total {
                StatusClass::Success
            } else {
                StatusClass::MoreFrames
            };

            if response.class() != expected {
                warn!(
                    %operation,
                    frame = index,
                    status = %response.status(),
                    "SAM operation aborted"
                );
                return Err(Error::status(response.status(), output.freeze()));
            }
            output.extend_from_slice(response.payload());
        }

        Ok(output.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use nexum_apdu_core::{TransportError, mock::MockTransport};

    #[test]
    fn test_chained_output_is_concatenated() {
        let transport =
            MockTransport::new([hex!("0102 90AF").to_vec(), hex!("0304 9000").to_vec()]);
        let mut sam = Sam::new(transport);

        let output = sam.encipher_offline_data(CryptoAlgorithm::Des, &[0u8; 256]).unwrap();
        assert_eq!(output.as_ref(), hex!("01020304"));
        assert_eq!(sam.transport().commands().len(), 2);
    }

    #[test]
    fn test_failure_keeps_partial_output() {
        let transport = MockTransport::new([
            hex!("AABB 90AF").to_vec(),
            hex!("6982").to_vec(),
            hex!("9000").to_vec(),
        ]);
        let mut sam = Sam::new(transport);

        let result = sam.encipher_offline_data(CryptoAlgorithm::Aes, &[0u8; 720]);
        match result {
            Err(Error::Status {
                status, partial, ..
            }) => {
                assert_eq!(status.to_u16(), 0x6982);
                assert_eq!(partial.as_ref(), hex!("AABB"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // No further frames after the failure
        assert_eq!(sam.transport().commands().len(), 2);
        assert_eq!(sam.transport().remaining(), 1);
    }

    #[test]
    fn test_terminal_frame_must_succeed() {
        // A single frame answered with "more data" is a protocol error
        let transport = MockTransport::new([hex!("90AF").to_vec()]);
        let mut sam = Sam::new(transport);
        assert!(matches!(
            sam.generate_mac(CryptoAlgorithm::Aes, &[0u8; 4]),
            Err(Error::Status { .. })
        ));
    }

    #[test]
    fn test_precondition_failure_sends_nothing() {
        let mut sam = Sam::new(MockTransport::default());
        assert!(matches!(
            sam.encipher_data(CryptoAlgorithm::Des, &[0u8; 7]),
            Err(Error::InvalidLength { .. })
        ));
        assert_eq!(
            sam.decipher_data(CryptoAlgorithm::Aes, &[0u8; 16]),
            Err(Error::NotSupported(SamOperation::DecipherData))
        );
        assert!(sam.transport().commands().is_empty());
    }

    #[test]
    fn test_transport_error_is_forwarded() {
        let mut sam = Sam::new(MockTransport::failing(TransportError::Device));
        assert_eq!(
            sam.generate_mac(CryptoAlgorithm::Des, &[]),
            Err(Error::Transport(TransportError::Device))
        );
    }

    #[test]
    fn test_malformed_response() {
        let mut sam = Sam::new(MockTransport::new([vec![0x90u8]]));
        assert_eq!(
            sam.load_init_vector(CryptoAlgorithm::Aes, &[0u8; 16]),
            Err(Error::MalformedResponse { length: 1 })
        );
    }
}
