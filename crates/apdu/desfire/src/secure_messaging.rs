//! Secure messaging for authenticated DESFire sessions
//!
//! EV2 sessions derive a fresh IV for every command from the transaction
//! identifier and the command counter, and protect frames with a truncated
//! CMAC. EV1 sessions chain a single IV through every CMAC and CBC operation
//! and protect enciphered frames with a CRC32.

use derive_more::Display;
use nexum_apdu_core::{CommandError, command::MAX_DATA_LENGTH};
use subtle::ConstantTimeEq;
use tracing::trace;
use zeroize::Zeroizing;

use crate::{
    Error, Result,
    auth::AuthMode,
    constants::{CRC32_LENGTH, MAC_LENGTH, label},
    crypto::{self, AES_BLOCK_SIZE, KeyType, TruncatedMac},
    session::Session,
};

/// Communication mode of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum CommMode {
    /// No protection
    #[default]
    Plain,
    /// Data sent in the clear, protected by a MAC
    Mac,
    /// Data enciphered and protected by a MAC (EV2) or CRC32 (EV1)
    Full,
}

impl Session {
    fn ev2_iv(&self, prefix: [u8; 2], counter: u16) -> Result<[u8; AES_BLOCK_SIZE]> {
        let mut input = Zeroizing::new([0u8; AES_BLOCK_SIZE]);
        input[0..2].copy_from_slice(&prefix);
        input[2..6].copy_from_slice(self.transaction_id());
        input[6..8].copy_from_slice(&counter.to_le_bytes());
        crypto::aes_encrypt_block(self.keys().enc(), &input)
    }

    /// IV for command encryption at the current counter
    pub fn command_iv(&self) -> Result<[u8; AES_BLOCK_SIZE]> {
        self.ev2_iv(label::IV_COMMAND, self.command_counter())
    }

    /// IV for response decryption at the current counter
    ///
    /// Responses are processed after the counter has been advanced, so this
    /// uses the incremented value.
    pub fn response_iv(&self) -> Result<[u8; AES_BLOCK_SIZE]> {
        self.ev2_iv(label::IV_RESPONSE, self.command_counter())
    }

    /// Encrypt command data under the session encryption key
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        match self.mode() {
            AuthMode::Ev2First => {
                let iv = self.command_iv()?;
                self.iv = iv.to_vec();
                crypto::aes_encrypt_padded(self.keys().enc(), &iv, plaintext)
            }
            AuthMode::Legacy(key_type) => {
                let block_size = key_type.block_size();
                let mut buf = plaintext.to_vec();
                buf.resize(plaintext.len().div_ceil(block_size).max(1) * block_size, 0x00);
                crypto::encrypt_cbc(key_type, self.keys().enc(), &self.iv, &mut buf)?;
                self.iv = buf[buf.len() - block_size..].to_vec();
                Ok(buf)
            }
        }
    }

    /// Decrypt response data under the session encryption key
    ///
    /// EV2 padding is stripped. EV1 plaintext is returned with its zero
    /// padding and CRC, see [`Session::unwrap_response`].
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self.mode() {
            AuthMode::Ev2First => {
                let iv = self.response_iv()?;
                self.iv = iv.to_vec();
                crypto::aes_decrypt_padded(self.keys().enc(), &iv, ciphertext)
            }
            AuthMode::Legacy(key_type) => {
                let block_size = key_type.block_size();
                if ciphertext.is_empty() || ciphertext.len() % block_size != 0 {
                    return Err(Error::malformed(
                        "ciphertext is not block aligned",
                        ciphertext.len(),
                    ));
                }
                let mut buf = ciphertext.to_vec();
                crypto::decrypt_cbc(key_type, self.keys().enc(), &self.iv, &mut buf)?;
                self.iv = ciphertext[ciphertext.len() - block_size..].to_vec();
                Ok(buf)
            }
        }
    }

    /// MAC over a command
    ///
    /// EV2: `CMAC(KSesAuthMAC, cmd || counter || TI || data)` truncated to the
    /// odd-indexed bytes. EV1: `CMAC(K, cmd || data)` chained through the
    /// session IV, the IV becomes the full CMAC and the first eight bytes are
    /// returned.
    pub fn mac(&mut self, cmd: u8, data: &[u8]) -> Result<TruncatedMac> {
        self.ensure_usable()?;
        self.mac_with_code(cmd, data)
    }

    /// MAC over a response, computed after the counter was advanced
    pub fn response_mac(&mut self, return_code: u8, data: &[u8]) -> Result<TruncatedMac> {
        match self.mode() {
            AuthMode::Ev2First => self.mac_with_code(return_code, data),
            AuthMode::Legacy(key_type) => {
                let mut input = Zeroizing::new(Vec::with_capacity(data.len() + 1));
                input.extend_from_slice(data);
                input.push(return_code);
                self.legacy_cmac(key_type, &input)
            }
        }
    }

    /// Verify a response MAC in constant time
    pub fn verify_response_mac(
        &mut self,
        return_code: u8,
        data: &[u8],
        received: &[u8],
    ) -> Result<()> {
        let expected = self.response_mac(return_code, data)?;
        if received.len() != MAC_LENGTH || !bool::from(expected[..].ct_eq(received)) {
            return Err(Error::IntegrityError("response MAC mismatch"));
        }
        Ok(())
    }

    fn mac_with_code(&mut self, code: u8, data: &[u8]) -> Result<TruncatedMac> {
        match self.mode() {
            AuthMode::Ev2First => {
                let mut input = Zeroizing::new(Vec::with_capacity(data.len() + 7));
                input.push(code);
                input.extend_from_slice(&self.command_counter().to_le_bytes());
                input.extend_from_slice(self.transaction_id());
                input.extend_from_slice(data);
                let full = Zeroizing::new(crypto::cmac_aes(self.keys().mac(), &input)?);
                Ok(crypto::truncate_mac(&full))
            }
            AuthMode::Legacy(key_type) => {
                let mut input = Zeroizing::new(Vec::with_capacity(data.len() + 1));
                input.push(code);
                input.extend_from_slice(data);
                self.legacy_cmac(key_type, &input)
            }
        }
    }

    fn legacy_cmac(&mut self, key_type: KeyType, data: &[u8]) -> Result<TruncatedMac> {
        let full = crypto::cmac_with_iv(key_type, self.keys().mac(), &self.iv, data)?;
        let mut mac = [0u8; MAC_LENGTH];
        mac.copy_from_slice(&full[..MAC_LENGTH]);
        self.iv = full;
        Ok(mac)
    }

    /// Build the protected body of a native command
    ///
    /// `header` is sent in the clear in every mode, `data` is enciphered in
    /// [`CommMode::Full`]. Uses the current counter; the caller advances it
    /// once the card has answered.
    pub fn wrap_command(
        &mut self,
        cmd: u8,
        header: &[u8],
        data: &[u8],
        mode: CommMode,
    ) -> Result<Vec<u8>> {
        self.ensure_usable()?;

        // Framing must not fail once the IV has moved on
        let length = self.wrapped_length(header.len(), data.len(), mode);
        if length > MAX_DATA_LENGTH {
            return Err(CommandError::DataTooLong {
                length,
                max: MAX_DATA_LENGTH,
            }
            .into());
        }

        let mut body = Vec::with_capacity(length);
        body.extend_from_slice(header);

        match self.mode() {
            AuthMode::Ev2First => {
                match mode {
                    CommMode::Full if !data.is_empty() => {
                        body.extend_from_slice(&self.encrypt(data)?);
                    }
                    _ => body.extend_from_slice(data),
                }
                if mode != CommMode::Plain {
                    let mac = self.mac(cmd, &body)?;
                    body.extend_from_slice(&mac);
                }
            }
            AuthMode::Legacy(_) => match mode {
                CommMode::Plain | CommMode::Mac => {
                    body.extend_from_slice(data);
                    let mac = self.mac(cmd, &body)?;
                    if mode == CommMode::Mac {
                        body.extend_from_slice(&mac);
                    }
                }
                CommMode::Full => {
                    let mut checked = Zeroizing::new(Vec::with_capacity(
                        1 + header.len() + data.len() + CRC32_LENGTH,
                    ));
                    checked.push(cmd);
                    checked.extend_from_slice(header);
                    checked.extend_from_slice(data);
                    let crc = crypto::crc32(&checked);

                    let mut plaintext = Zeroizing::new(Vec::with_capacity(data.len() + 4));
                    plaintext.extend_from_slice(data);
                    plaintext.extend_from_slice(&crc);
                    body.extend_from_slice(&self.encrypt(&plaintext)?);
                }
            },
        }

        trace!(cmd = format_args!("{cmd:#04x}"), %mode, len = body.len(), "Wrapped command");
        Ok(body)
    }

    /// Length of the body [`Session::wrap_command`] would produce
    pub const fn wrapped_length(
        &self,
        header_len: usize,
        data_len: usize,
        mode: CommMode,
    ) -> usize {
        let protected = match (self.mode(), mode) {
            (_, CommMode::Plain) => data_len,
            (AuthMode::Ev2First, CommMode::Full) if data_len > 0 => {
                (data_len / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE + MAC_LENGTH
            }
            (_, CommMode::Mac) | (AuthMode::Ev2First, CommMode::Full) => data_len + MAC_LENGTH,
            (AuthMode::Legacy(key_type), CommMode::Full) => {
                let block_size = key_type.block_size();
                (data_len + CRC32_LENGTH).div_ceil(block_size) * block_size
            }
        };
        header_len + protected
    }

    /// Check and strip the protection of a response payload
    ///
    /// `return_code` is the second status byte. Must be called after the
    /// counter has been advanced for this exchange.
    pub fn unwrap_response(
        &mut self,
        return_code: u8,
        payload: &[u8],
        mode: CommMode,
    ) -> Result<Vec<u8>> {
        match self.mode() {
            AuthMode::Ev2First => match mode {
                CommMode::Plain => Ok(payload.to_vec()),
                CommMode::Mac | CommMode::Full => {
                    let (data, mac) = split_mac(payload)?;
                    self.verify_response_mac(return_code, data, mac)?;
                    if mode == CommMode::Full && !data.is_empty() {
                        self.decrypt(data)
                    } else {
                        Ok(data.to_vec())
                    }
                }
            },
            AuthMode::Legacy(key_type) => match mode {
                CommMode::Plain => {
                    self.response_mac(return_code, payload)?;
                    Ok(payload.to_vec())
                }
                CommMode::Mac => {
                    let (data, mac) = split_mac(payload)?;
                    self.verify_response_mac(return_code, data, mac)?;
                    Ok(data.to_vec())
                }
                CommMode::Full => {
                    let plaintext = Zeroizing::new(self.decrypt(payload)?);
                    strip_crc(key_type, &plaintext, return_code)
                }
            },
        }
    }
}

fn split_mac(payload: &[u8]) -> Result<(&[u8], &[u8])> {
    if payload.len() < MAC_LENGTH {
        return Err(Error::malformed("response shorter than its MAC", payload.len()));
    }
    Ok(payload.split_at(payload.len() - MAC_LENGTH))
}

// EV1 enciphered responses carry `data || CRC32(data || status) || 00..`.
// The data length is not transmitted, so take the longest one that checks.
fn strip_crc(key_type: KeyType, plaintext: &[u8], return_code: u8) -> Result<Vec<u8>> {
    let block_size = key_type.block_size();
    let Some(max_len) = plaintext.len().checked_sub(CRC32_LENGTH) else {
        return Err(Error::malformed("enciphered response too short", plaintext.len()));
    };
    let min_len = max_len.saturating_sub(block_size - 1);

    for len in (min_len..=max_len).rev() {
        let (data, rest) = plaintext.split_at(len);
        let (crc, padding) = rest.split_at(CRC32_LENGTH);
        if padding.iter().any(|&b| b != 0) {
            continue;
        }

        let mut checked = Zeroizing::new(Vec::with_capacity(len + 1));
        checked.extend_from_slice(data);
        checked.push(return_code);
        if bool::from(crypto::crc32(&checked)[..].ct_eq(crc)) {
            return Ok(data.to_vec());
        }
    }

    Err(Error::IntegrityError("response CRC mismatch"))
}
