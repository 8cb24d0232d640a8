//! Cryptographic operations for DESFire authentication and secure messaging
//!
//! This module provides the block cipher, CMAC, key derivation and checksum
//! helpers shared by the handshake and the session crypto context. All
//! functions operate on independently owned buffers and never log their inputs.

use aes::Aes128;
use cipher::{
    BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::{Iso7816, NoPadding},
};
use cmac::{Cmac, Mac};
use derive_more::Display;
use des::{TdesEde2, TdesEde3};
use zeroize::Zeroizing;

use crate::{
    Error, Result,
    constants::{MAC_LENGTH, label},
    session::SessionKeys,
};

/// Truncated MAC carried in secure messaging frames
pub type TruncatedMac = [u8; MAC_LENGTH];

/// AES block size, also the EV2 nonce length
pub const AES_BLOCK_SIZE: usize = 16;

/// Cipher of a long-term DESFire key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum KeyType {
    /// AES-128
    #[display("AES-128")]
    Aes128,
    /// Two-key triple DES
    #[display("2K3DES")]
    TwoKeyTdes,
    /// Three-key triple DES
    #[display("3K3DES")]
    ThreeKeyTdes,
}

impl KeyType {
    /// Key length in bytes
    pub const fn key_length(self) -> usize {
        match self {
            Self::Aes128 | Self::TwoKeyTdes => 16,
            Self::ThreeKeyTdes => 24,
        }
    }

    /// Cipher block size in bytes
    pub const fn block_size(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::TwoKeyTdes | Self::ThreeKeyTdes => 8,
        }
    }

    /// Length of RndA and RndB in the authentication handshake
    pub const fn nonce_length(self) -> usize {
        match self {
            Self::Aes128 | Self::ThreeKeyTdes => 16,
            Self::TwoKeyTdes => 8,
        }
    }

    const fn cmac_polynomial(self) -> u8 {
        match self.block_size() {
            16 => 0x87,
            _ => 0x1B,
        }
    }
}

/// Rotate a byte string left by one byte
pub fn rotate_left(data: &[u8]) -> Vec<u8> {
    let mut rotated = data.to_vec();
    if !rotated.is_empty() {
        rotated.rotate_left(1);
    }
    rotated
}

fn check_key(key_type: KeyType, key: &[u8]) -> Result<()> {
    if key.len() != key_type.key_length() {
        return Err(Error::InvalidKeyLength {
            expected: key_type.key_length(),
            actual: key.len(),
        });
    }
    Ok(())
}

fn check_iv(key_type: KeyType, iv: &[u8]) -> Result<()> {
    if iv.len() != key_type.block_size() {
        return Err(Error::Crypto("IV length does not match the cipher block size"));
    }
    Ok(())
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let len = buf.len();
    cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto("invalid key or IV length"))?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::Crypto("data is not block aligned"))?;
    Ok(())
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto("invalid key or IV length"))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::Crypto("data is not block aligned"))?;
    Ok(())
}

/// Encrypt block-aligned data in place in CBC mode
pub fn encrypt_cbc(key_type: KeyType, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    check_key(key_type, key)?;
    check_iv(key_type, iv)?;
    match key_type {
        KeyType::Aes128 => cbc_encrypt::<Aes128>(key, iv, buf),
        KeyType::TwoKeyTdes => cbc_encrypt::<TdesEde2>(key, iv, buf),
        KeyType::ThreeKeyTdes => cbc_encrypt::<TdesEde3>(key, iv, buf),
    }
}

/// Decrypt block-aligned data in place in CBC mode
pub fn decrypt_cbc(key_type: KeyType, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    check_key(key_type, key)?;
    check_iv(key_type, iv)?;
    match key_type {
        KeyType::Aes128 => cbc_decrypt::<Aes128>(key, iv, buf),
        KeyType::TwoKeyTdes => cbc_decrypt::<TdesEde2>(key, iv, buf),
        KeyType::ThreeKeyTdes => cbc_decrypt::<TdesEde3>(key, iv, buf),
    }
}

/// Encrypt a single AES block
pub fn aes_encrypt_block(key: &[u8], block: &[u8; AES_BLOCK_SIZE]) -> Result<[u8; AES_BLOCK_SIZE]> {
    let mut out = *block;
    encrypt_cbc(KeyType::Aes128, key, &[0u8; AES_BLOCK_SIZE], &mut out)?;
    Ok(out)
}

/// AES-CBC encrypt with ISO/IEC 9797-1 method 2 padding
///
/// Padding is always added, so the ciphertext is one block longer than the
/// input when the input is already block aligned.
pub fn aes_encrypt_padded(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(KeyType::Aes128, key)?;
    check_iv(KeyType::Aes128, iv)?;

    let mut buf = vec![0u8; (data.len() / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE];
    buf[..data.len()].copy_from_slice(data);

    let len = cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto("invalid key or IV length"))?
        .encrypt_padded_mut::<Iso7816>(&mut buf, data.len())
        .map_err(|_| Error::Crypto("padding failed"))?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// AES-CBC decrypt and strip ISO/IEC 9797-1 method 2 padding
pub fn aes_decrypt_padded(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(KeyType::Aes128, key)?;
    check_iv(KeyType::Aes128, iv)?;

    let mut buf = data.to_vec();
    let len = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto("invalid key or IV length"))?
        .decrypt_padded_mut::<Iso7816>(&mut buf)
        .map_err(|_| Error::IntegrityError("invalid padding"))?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// AES-128 CMAC (NIST SP 800-38B)
pub fn cmac_aes(key: &[u8], data: &[u8]) -> Result<[u8; AES_BLOCK_SIZE]> {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key).map_err(|_| {
        Error::InvalidKeyLength {
            expected: KeyType::Aes128.key_length(),
            actual: key.len(),
        }
    })?;
    mac.update(data);

    let mut out = [0u8; AES_BLOCK_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

// Left shift by one bit, reducing with the block size polynomial
fn dbl(block: &[u8], polynomial: u8) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; block.len()]);
    let mut carry = 0u8;
    for (o, b) in out.iter_mut().zip(block).rev() {
        *o = (b << 1) | carry;
        carry = b >> 7;
    }
    if let (1, Some(last)) = (carry, out.last_mut()) {
        *last ^= polynomial;
    }
    out
}

/// CMAC over `data` with an explicit chaining IV
///
/// DESFire EV1 secure messaging chains the CMAC through the session IV,
/// which the stock CMAC construction does not expose. With a zero IV the
/// result equals the standard CMAC. Returns the full block.
pub fn cmac_with_iv(key_type: KeyType, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let block_size = key_type.block_size();

    let mut l = Zeroizing::new(vec![0u8; block_size]);
    encrypt_cbc(key_type, key, &vec![0u8; block_size], &mut l)?;
    let k1 = dbl(&l, key_type.cmac_polynomial());
    let k2 = dbl(&k1, key_type.cmac_polynomial());

    let mut buf = Zeroizing::new(data.to_vec());
    let subkey = if !buf.is_empty() && buf.len() % block_size == 0 {
        k1
    } else {
        buf.push(0x80);
        let padded = buf.len().div_ceil(block_size) * block_size;
        buf.resize(padded, 0x00);
        k2
    };

    let last = buf.len() - block_size;
    buf[last..]
        .iter_mut()
        .zip(subkey.iter())
        .for_each(|(b, k)| *b ^= k);

    encrypt_cbc(key_type, key, iv, &mut buf)?;
    Ok(buf[last..].to_vec())
}

/// Truncate an EV2 CMAC to its odd-indexed bytes
pub fn truncate_mac(mac: &[u8; AES_BLOCK_SIZE]) -> TruncatedMac {
    core::array::from_fn(|i| mac[2 * i + 1])
}

/// Derive the EV2 session keys from the long-term key and both nonces
///
/// ```text
/// SV1 = A5 5A 00 01 00 80 || RndA[0..2] || (RndA[2..8] ^ RndB[0..6])
///       || RndB[6..16] || RndA[8..16]
/// ```
///
/// SV2 is identical with the `5A A5` prefix. `KSesAuthENC = CMAC(K, SV1)`,
/// `KSesAuthMAC = CMAC(K, SV2)`.
pub fn derive_ev2_session_keys(key: &[u8], rnd_a: &[u8], rnd_b: &[u8]) -> Result<SessionKeys> {
    if rnd_a.len() != AES_BLOCK_SIZE || rnd_b.len() != AES_BLOCK_SIZE {
        return Err(Error::Crypto("EV2 nonces must be 16 bytes"));
    }

    let mut context = Zeroizing::new([0u8; 26]);
    context[0..2].copy_from_slice(&rnd_a[0..2]);
    for i in 0..6 {
        context[2 + i] = rnd_a[2 + i] ^ rnd_b[i];
    }
    context[8..18].copy_from_slice(&rnd_b[6..16]);
    context[18..26].copy_from_slice(&rnd_a[8..16]);

    let session_vector = |prefix: [u8; 2]| {
        let mut sv = Zeroizing::new(Vec::with_capacity(32));
        sv.extend_from_slice(&prefix);
        sv.extend_from_slice(&label::SV_COUNTER_LENGTH);
        sv.extend_from_slice(&context[..]);
        sv
    };

    let enc = Zeroizing::new(cmac_aes(key, &session_vector(label::SV_ENC))?);
    let mac = Zeroizing::new(cmac_aes(key, &session_vector(label::SV_MAC))?);
    Ok(SessionKeys::new(enc.to_vec(), mac.to_vec()))
}

/// Derive the EV1 session key by interleaving halves of both nonces
///
/// Encryption and MAC share the resulting key.
pub fn derive_legacy_session_key(
    key_type: KeyType,
    rnd_a: &[u8],
    rnd_b: &[u8],
) -> Result<SessionKeys> {
    let nonce_length = key_type.nonce_length();
    if rnd_a.len() != nonce_length || rnd_b.len() != nonce_length {
        return Err(Error::Crypto("nonce length does not match key type"));
    }

    let ranges: &[core::ops::Range<usize>] = match key_type {
        KeyType::TwoKeyTdes => &[0..4, 4..8],
        KeyType::ThreeKeyTdes => &[0..4, 6..10, 12..16],
        KeyType::Aes128 => &[0..4, 12..16],
    };

    let mut key = Zeroizing::new(Vec::with_capacity(key_type.key_length()));
    for range in ranges {
        key.extend_from_slice(&rnd_a[range.clone()]);
        key.extend_from_slice(&rnd_b[range.clone()]);
    }
    Ok(SessionKeys::new(key.to_vec(), key.to_vec()))
}

/// DESFire CRC32: the IEEE CRC-32 complemented, encoded little-endian
pub fn crc32(data: &[u8]) -> [u8; 4] {
    (!crc32fast::hash(data)).to_le_bytes()
}
