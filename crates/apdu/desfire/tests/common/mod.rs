//! Simulated DESFire card
//!
//! Implements the card side of the authentication handshakes and a small
//! set of echo commands that return their data under the requested
//! communication mode.

#![allow(dead_code)]

use hex_literal::hex;
use nexum_apdu_core::{Bytes, CardTransport, Command, TransportError};
use nexum_apdu_desfire::{
    KeyType,
    constants::{ins, label},
    crypto,
};

/// Echo in plain mode
pub(crate) const ECHO_PLAIN: u8 = 0x51;
/// Echo in MAC mode
pub(crate) const ECHO_MAC: u8 = 0x52;
/// Echo in full mode (EV2 only)
pub(crate) const ECHO_FULL: u8 = 0x53;

/// Transaction identifier handed out by the card
pub(crate) const TRANSACTION_ID: [u8; 4] = hex!("9D00C4DF");

const RND_B: [u8; 16] = hex!("B9E2FC789B64BF237CCCAA20EC7E6E48");

const OK: [u8; 2] = hex!("9100");
const ADDITIONAL_FRAME: [u8; 2] = hex!("91AF");
const AUTHENTICATION_ERROR: [u8; 2] = hex!("91AE");
const INTEGRITY_ERROR: [u8; 2] = hex!("911E");
const ILLEGAL_COMMAND: [u8; 2] = hex!("911C");
const NO_SUCH_KEY: [u8; 2] = hex!("9140");

#[derive(Debug)]
enum State {
    Idle,
    Challenged {
        ev2: bool,
        key_type: KeyType,
        key: Vec<u8>,
        iv: Vec<u8>,
    },
    Ev2 {
        enc: Vec<u8>,
        mac: Vec<u8>,
        counter: u16,
    },
    Legacy {
        key_type: KeyType,
        key: Vec<u8>,
        iv: Vec<u8>,
    },
}

/// Card with a fixed key table and a deterministic RndB
#[derive(Debug)]
pub(crate) struct SimulatedCard {
    keys: Vec<(u8, KeyType, Vec<u8>)>,
    state: State,
    /// Answer the handshake with RndA instead of its rotation
    pub(crate) skip_rotation: bool,
    /// Fail every exchange at the transport level
    pub(crate) unplugged: bool,
    /// Answer secure messaging commands with a single byte
    pub(crate) truncate: bool,
    /// Number of frames received
    pub(crate) frames: usize,
}

impl SimulatedCard {
    /// Create a card holding `key` in slot `key_number`
    pub(crate) fn new(key_number: u8, key_type: KeyType, key: &[u8]) -> Self {
        Self {
            keys: vec![(key_number, key_type, key.to_vec())],
            state: State::Idle,
            skip_rotation: false,
            unplugged: false,
            truncate: false,
            frames: 0,
        }
    }

    /// Card-side command counter of the EV2 session
    pub(crate) fn counter(&self) -> Option<u16> {
        match self.state {
            State::Ev2 { counter, .. } => Some(counter),
            _ => None,
        }
    }

    fn key(&self, key_number: u8) -> Option<(KeyType, Vec<u8>)> {
        self.keys
            .iter()
            .find(|(number, _, _)| *number == key_number)
            .map(|(_, key_type, key)| (*key_type, key.clone()))
    }

    fn process(&mut self, command: &Command) -> Vec<u8> {
        let data = command.data.as_deref().unwrap_or_default().to_vec();
        match command.ins {
            ins::AUTHENTICATE_EV2_FIRST | ins::AUTHENTICATE_ISO | ins::AUTHENTICATE_AES => {
                self.begin(command.ins, &data)
            }
            ins::ADDITIONAL_FRAME => self.confirm(&data),
            ECHO_PLAIN | ECHO_MAC | ECHO_FULL if self.truncate => vec![0x91],
            ECHO_PLAIN | ECHO_MAC | ECHO_FULL => self.echo(command.ins, &data),
            _ => ILLEGAL_COMMAND.to_vec(),
        }
    }

    fn begin(&mut self, instruction: u8, data: &[u8]) -> Vec<u8> {
        self.state = State::Idle;
        let Some((key_type, key)) = data.first().and_then(|&number| self.key(number)) else {
            return NO_SUCH_KEY.to_vec();
        };

        let ev2 = instruction == ins::AUTHENTICATE_EV2_FIRST;
        let expected_instruction = match key_type {
            KeyType::Aes128 if !ev2 => ins::AUTHENTICATE_AES,
            KeyType::Aes128 => ins::AUTHENTICATE_EV2_FIRST,
            _ => ins::AUTHENTICATE_ISO,
        };
        if instruction != expected_instruction {
            return AUTHENTICATION_ERROR.to_vec();
        }

        let block_size = key_type.block_size();
        let mut challenge = RND_B[..key_type.nonce_length()].to_vec();
        crypto::encrypt_cbc(key_type, &key, &vec![0u8; block_size], &mut challenge).unwrap();

        let iv = if ev2 {
            vec![0u8; block_size]
        } else {
            challenge[challenge.len() - block_size..].to_vec()
        };
        self.state = State::Challenged {
            ev2,
            key_type,
            key,
            iv,
        };

        [challenge, ADDITIONAL_FRAME.to_vec()].concat()
    }

    fn confirm(&mut self, data: &[u8]) -> Vec<u8> {
        let State::Challenged {
            ev2,
            key_type,
            key,
            iv,
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return ILLEGAL_COMMAND.to_vec();
        };

        let nonce_length = key_type.nonce_length();
        let block_size = key_type.block_size();
        let rnd_b = &RND_B[..nonce_length];
        if data.len() != 2 * nonce_length {
            return AUTHENTICATION_ERROR.to_vec();
        }

        let mut token = data.to_vec();
        crypto::decrypt_cbc(key_type, &key, &iv, &mut token).unwrap();
        let (rnd_a, rnd_b_rotated) = token.split_at(nonce_length);
        if rnd_b_rotated != crypto::rotate_left(rnd_b) {
            return AUTHENTICATION_ERROR.to_vec();
        }

        let proof = if self.skip_rotation {
            rnd_a.to_vec()
        } else {
            crypto::rotate_left(rnd_a)
        };

        if ev2 {
            let mut confirmation = TRANSACTION_ID.to_vec();
            confirmation.extend_from_slice(&proof);
            confirmation.extend_from_slice(&[0u8; 12]);
            crypto::encrypt_cbc(key_type, &key, &[0u8; 16], &mut confirmation).unwrap();

            let keys = crypto::derive_ev2_session_keys(&key, rnd_a, rnd_b).unwrap();
            self.state = State::Ev2 {
                enc: keys.enc().to_vec(),
                mac: keys.mac().to_vec(),
                counter: 0,
            };
            [confirmation, OK.to_vec()].concat()
        } else {
            let mut confirmation = proof;
            let iv = &data[data.len() - block_size..];
            crypto::encrypt_cbc(key_type, &key, iv, &mut confirmation).unwrap();

            let keys = crypto::derive_legacy_session_key(key_type, rnd_a, rnd_b).unwrap();
            self.state = State::Legacy {
                key_type,
                key: keys.enc().to_vec(),
                iv: vec![0u8; block_size],
            };
            [confirmation, OK.to_vec()].concat()
        }
    }

    fn echo(&mut self, instruction: u8, data: &[u8]) -> Vec<u8> {
        match &mut self.state {
            State::Ev2 { enc, mac, counter } => {
                match ev2_echo(instruction, data, enc, mac, *counter) {
                    Some(response) => {
                        *counter += 1;
                        response
                    }
                    None => {
                        self.state = State::Idle;
                        INTEGRITY_ERROR.to_vec()
                    }
                }
            }
            State::Legacy { key_type, key, iv } => {
                match legacy_echo(instruction, data, *key_type, key, iv) {
                    Some(response) => response,
                    None => {
                        self.state = State::Idle;
                        INTEGRITY_ERROR.to_vec()
                    }
                }
            }
            _ => AUTHENTICATION_ERROR.to_vec(),
        }
    }
}

fn ev2_iv(enc: &[u8], prefix: [u8; 2], counter: u16) -> [u8; 16] {
    let mut input = [0u8; 16];
    input[0..2].copy_from_slice(&prefix);
    input[2..6].copy_from_slice(&TRANSACTION_ID);
    input[6..8].copy_from_slice(&counter.to_le_bytes());
    crypto::aes_encrypt_block(enc, &input).unwrap()
}

fn ev2_mac(mac: &[u8], code: u8, counter: u16, data: &[u8]) -> [u8; 8] {
    let mut input = vec![code];
    input.extend_from_slice(&counter.to_le_bytes());
    input.extend_from_slice(&TRANSACTION_ID);
    input.extend_from_slice(data);
    crypto::truncate_mac(&crypto::cmac_aes(mac, &input).unwrap())
}

fn ev2_echo(instruction: u8, data: &[u8], enc: &[u8], mac: &[u8], counter: u16) -> Option<Vec<u8>> {
    let next = counter + 1;
    if instruction == ECHO_PLAIN {
        return Some([data, &OK[..]].concat());
    }

    let (body, received) = data.split_at(data.len().checked_sub(8)?);
    if ev2_mac(mac, instruction, counter, body) != received {
        return None;
    }

    let reply = if instruction == ECHO_FULL {
        let iv = ev2_iv(enc, label::IV_COMMAND, counter);
        let plain = crypto::aes_decrypt_padded(enc, &iv, body).ok()?;
        let iv = ev2_iv(enc, label::IV_RESPONSE, next);
        crypto::aes_encrypt_padded(enc, &iv, &plain).ok()?
    } else {
        body.to_vec()
    };

    let tag = ev2_mac(mac, 0x00, next, &reply);
    Some([&reply[..], &tag[..], &OK[..]].concat())
}

fn legacy_echo(
    instruction: u8,
    data: &[u8],
    key_type: KeyType,
    key: &[u8],
    iv: &mut Vec<u8>,
) -> Option<Vec<u8>> {
    let body = match instruction {
        ECHO_PLAIN => data,
        ECHO_MAC => &data[..data.len().checked_sub(8)?],
        _ => return None,
    };

    let input = [&[instruction][..], body].concat();
    let full = crypto::cmac_with_iv(key_type, key, iv, &input).ok()?;
    if instruction == ECHO_MAC && full[..8] != data[body.len()..] {
        return None;
    }
    *iv = full;

    let full = crypto::cmac_with_iv(key_type, key, iv, &[body, &[0x00][..]].concat()).ok()?;
    let reply = if instruction == ECHO_MAC {
        [body, &full[..8], &OK[..]].concat()
    } else {
        [body, &OK[..]].concat()
    };
    *iv = full;
    Some(reply)
}

impl CardTransport for SimulatedCard {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.frames += 1;
        if self.unplugged {
            return Err(TransportError::Connection);
        }

        let command =
            Command::from_bytes(command).map_err(|e| TransportError::other(e.to_string()))?;
        Ok(Bytes::from(self.process(&command)))
    }
}
