//! Mutual authentication handshakes
//!
//! [`Handshake`] is a sans-IO state machine: it builds the command frames and
//! consumes the card's responses, leaving the transport round trips to the
//! caller. A successful handshake yields a [`Session`].
//!
//! ```text
//! Idle --respond--> ChallengeIssued --complete--> SessionEstablished
//!   \                     |
//!    `------------------> Failed
//! ```

use std::fmt;

use derive_more::Display;
use nexum_apdu_core::{Command, Response, response::status::common};
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    Error, Result,
    commands,
    config::AuthConfig,
    constants::{
        CAPABILITY_LENGTH, EV2_CONFIRMATION_LENGTH, SECONDARY_APPLICATION_FLAG,
        TRANSACTION_ID_LENGTH, ins,
    },
    crypto::{self, KeyType},
    session::Session,
};

/// Authentication variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AuthMode {
    /// AuthenticateEV2First with an AES-128 key
    #[display("EV2First")]
    Ev2First,
    /// EV1 authentication (AuthenticateISO or AuthenticateAES)
    #[display("Legacy({_0})")]
    Legacy(KeyType),
}

impl AuthMode {
    /// Cipher of the key this variant authenticates with
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::Ev2First => KeyType::Aes128,
            Self::Legacy(key_type) => key_type,
        }
    }

    /// Instruction of the first handshake frame
    pub const fn instruction(self) -> u8 {
        match self {
            Self::Ev2First => ins::AUTHENTICATE_EV2_FIRST,
            Self::Legacy(KeyType::Aes128) => ins::AUTHENTICATE_AES,
            Self::Legacy(_) => ins::AUTHENTICATE_ISO,
        }
    }
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AuthState {
    /// Nothing exchanged yet
    Idle,
    /// The card's challenge was answered, waiting for its confirmation
    ChallengeIssued,
    /// Both sides proved knowledge of the key
    SessionEstablished,
    /// The handshake was aborted
    Failed,
}

// Nonces and chaining IV kept between the two exchanges
#[derive(Zeroize, ZeroizeOnDrop)]
struct Pending {
    rnd_a: Vec<u8>,
    rnd_b: Vec<u8>,
    iv: Vec<u8>,
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}

/// Authentication handshake state machine
#[derive(Debug)]
pub struct Handshake {
    mode: AuthMode,
    key_number: u8,
    pcd_capabilities: Option<[u8; CAPABILITY_LENGTH]>,
    state: AuthState,
    pending: Option<Pending>,
}

impl Handshake {
    fn new(mode: AuthMode, key_number: u8, config: &AuthConfig) -> Self {
        let key_number = if config.secondary_application {
            key_number | SECONDARY_APPLICATION_FLAG
        } else {
            key_number
        };

        Self {
            mode,
            key_number,
            pcd_capabilities: config.pcd_capabilities,
            state: AuthState::Idle,
            pending: None,
        }
    }

    /// Create an AuthenticateEV2First handshake
    pub fn ev2_first(key_number: u8, config: &AuthConfig) -> Self {
        Self::new(AuthMode::Ev2First, key_number, config)
    }

    /// Create an EV1 handshake
    ///
    /// 2K3DES and 3K3DES keys use AuthenticateISO, AES keys use
    /// AuthenticateAES. Capability bytes are not exchanged.
    pub fn legacy(key_type: KeyType, key_number: u8, config: &AuthConfig) -> Self {
        Self::new(AuthMode::Legacy(key_type), key_number, config)
    }

    /// Current state
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Authentication variant
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Key number sent to the card, including the secondary application flag
    pub const fn key_number(&self) -> u8 {
        self.key_number
    }

    /// Build the first frame
    pub fn begin(&self) -> Result<Command> {
        self.expect_state(AuthState::Idle, "begin")?;
        match self.mode {
            AuthMode::Ev2First => commands::authenticate_ev2_first(
                self.key_number,
                self.pcd_capabilities.as_ref().map(|caps| caps.as_slice()),
            ),
            AuthMode::Legacy(_) => {
                commands::authenticate_legacy(self.mode.instruction(), self.key_number)
            }
        }
    }

    /// Answer the card's challenge with a fresh random RndA
    pub fn respond(&mut self, key: &[u8], response: &Response) -> Result<Command> {
        let mut rnd_a = Zeroizing::new(vec![0u8; self.mode.key_type().nonce_length()]);
        rand::rng().fill_bytes(&mut rnd_a);
        self.respond_with_nonce(key, response, &rnd_a)
    }

    /// Answer the card's challenge with the given RndA
    ///
    /// Only useful to reproduce published test vectors. Use [`Handshake::respond`]
    /// otherwise.
    pub fn respond_with_nonce(
        &mut self,
        key: &[u8],
        response: &Response,
        rnd_a: &[u8],
    ) -> Result<Command> {
        self.expect_state(AuthState::Idle, "respond")?;
        let result = self.do_respond(key, response, rnd_a);
        match &result {
            Ok(_) => self.state = AuthState::ChallengeIssued,
            Err(e) => self.fail(e),
        }
        result
    }

    /// Verify the card's confirmation and establish the session
    pub fn complete(&mut self, key: &[u8], response: &Response) -> Result<Session> {
        self.expect_state(AuthState::ChallengeIssued, "complete")?;
        let result = self.do_complete(key, response);
        match &result {
            Ok(_) => {
                self.state = AuthState::SessionEstablished;
                debug!(mode = %self.mode, key_number = self.key_number, "Session established");
            }
            Err(e) => self.fail(e),
        }
        result
    }

    fn expect_state(&self, expected: AuthState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                state: self.state,
                action,
            });
        }
        Ok(())
    }

    fn fail(&mut self, error: &Error) {
        warn!(mode = %self.mode, key_number = self.key_number, %error, "Authentication failed");
        self.state = AuthState::Failed;
        self.pending = None;
    }

    fn do_respond(&mut self, key: &[u8], response: &Response, rnd_a: &[u8]) -> Result<Command> {
        if response.status() != common::DESFIRE_ADDITIONAL_FRAME {
            return Err(Error::status(response.status()));
        }

        let key_type = self.mode.key_type();
        let nonce_length = key_type.nonce_length();
        let block_size = key_type.block_size();

        let encrypted_rnd_b = response.payload();
        if encrypted_rnd_b.len() != nonce_length {
            return Err(Error::malformed("unexpected challenge length", encrypted_rnd_b.len()));
        }
        if rnd_a.len() != nonce_length {
            return Err(Error::Crypto("RndA length does not match key type"));
        }

        let zero_iv = vec![0u8; block_size];
        let mut rnd_b = Zeroizing::new(encrypted_rnd_b.to_vec());
        crypto::decrypt_cbc(key_type, key, &zero_iv, &mut rnd_b)?;

        // EV1 chains the IV through the handshake, EV2 restarts from zero
        let iv = match self.mode {
            AuthMode::Ev2First => zero_iv,
            AuthMode::Legacy(_) => encrypted_rnd_b[nonce_length - block_size..].to_vec(),
        };

        let mut token = Zeroizing::new(Vec::with_capacity(2 * nonce_length));
        token.extend_from_slice(rnd_a);
        token.extend_from_slice(&crypto::rotate_left(&rnd_b));
        crypto::encrypt_cbc(key_type, key, &iv, &mut token)?;

        let next_iv = match self.mode {
            AuthMode::Ev2First => iv,
            AuthMode::Legacy(_) => token[token.len() - block_size..].to_vec(),
        };

        self.pending = Some(Pending {
            rnd_a: rnd_a.to_vec(),
            rnd_b: rnd_b.to_vec(),
            iv: next_iv,
        });

        debug!(
            mode = %self.mode,
            key_number = self.key_number,
            "Answered authentication challenge"
        );
        commands::additional_frame(&token)
    }

    fn do_complete(&mut self, key: &[u8], response: &Response) -> Result<Session> {
        if !response.is_success() {
            return Err(Error::status(response.status()));
        }
        let pending = self.pending.take().ok_or(Error::InvalidState {
            state: self.state,
            action: "complete",
        })?;

        let key_type = self.mode.key_type();
        let payload = response.payload();

        let expected_length = match self.mode {
            AuthMode::Ev2First => EV2_CONFIRMATION_LENGTH,
            AuthMode::Legacy(_) => key_type.nonce_length(),
        };
        if payload.len() != expected_length {
            return Err(Error::malformed("unexpected confirmation length", payload.len()));
        }

        let mut confirmation = Zeroizing::new(payload.to_vec());
        crypto::decrypt_cbc(key_type, key, &pending.iv, &mut confirmation)?;

        let (transaction_id, rnd_a_rotated, capabilities) = match self.mode {
            AuthMode::Ev2First => {
                let (ti, rest) = confirmation.split_at(TRANSACTION_ID_LENGTH);
                let (rnd, caps) = rest.split_at(key_type.nonce_length());
                (ti, rnd, caps)
            }
            AuthMode::Legacy(_) => (&[][..], &confirmation[..], &[][..]),
        };

        let expected = Zeroizing::new(crypto::rotate_left(&pending.rnd_a));
        if !bool::from(expected[..].ct_eq(rnd_a_rotated)) {
            return Err(Error::AuthenticationFailed);
        }

        let session = match self.mode {
            AuthMode::Ev2First => {
                let keys = crypto::derive_ev2_session_keys(key, &pending.rnd_a, &pending.rnd_b)?;
                let mut ti = [0u8; TRANSACTION_ID_LENGTH];
                ti.copy_from_slice(transaction_id);
                let mut pd_capabilities = [0u8; CAPABILITY_LENGTH];
                pd_capabilities.copy_from_slice(&capabilities[..CAPABILITY_LENGTH]);
                let mut pcd_capabilities = [0u8; CAPABILITY_LENGTH];
                pcd_capabilities.copy_from_slice(&capabilities[CAPABILITY_LENGTH..]);
                Session::ev2(keys, ti, self.key_number, pcd_capabilities, pd_capabilities)
            }
            AuthMode::Legacy(key_type) => {
                let keys =
                    crypto::derive_legacy_session_key(key_type, &pending.rnd_a, &pending.rnd_b)?;
                Session::legacy(self.mode, keys, self.key_number)
            }
        };

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use nexum_apdu_core::ApduCommand;

    const RND_A: [u8; 16] = hex!("13C5DB8A5930439FC3DEF9A4C675360F");
    const RND_B: [u8; 16] = hex!("B9E2FC789B64BF237CCCAA20EC7E6E48");

    fn encrypt(key_type: KeyType, key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        crypto::encrypt_cbc(key_type, key, iv, &mut buf).unwrap();
        buf
    }

    fn decrypt(key_type: KeyType, key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        crypto::decrypt_cbc(key_type, key, iv, &mut buf).unwrap();
        buf
    }

    fn challenge(key: &[u8]) -> Response {
        Response::new(
            encrypt(KeyType::Aes128, key, &[0u8; 16], &RND_B),
            common::DESFIRE_ADDITIONAL_FRAME,
        )
    }

    fn ev2_confirmation(key: &[u8], rnd_a_rotated: &[u8]) -> Response {
        let mut plain = hex!("9D00C4DF").to_vec();
        plain.extend_from_slice(rnd_a_rotated);
        plain.extend_from_slice(&[0u8; 12]);
        Response::new(
            encrypt(KeyType::Aes128, key, &[0u8; 16], &plain),
            common::DESFIRE_OK,
        )
    }

    #[test]
    fn test_ev2_handshake_vector() {
        let key = [0u8; 16];
        let mut handshake = Handshake::ev2_first(0x00, &AuthConfig::default());
        assert_eq!(
            handshake.begin().unwrap().to_bytes().as_ref(),
            hex!("90 71 00 00 02 00 00 00")
        );

        let part2 = handshake
            .respond_with_nonce(&key, &challenge(&key), &RND_A)
            .unwrap();
        assert_eq!(handshake.state(), AuthState::ChallengeIssued);
        assert_eq!(part2.cla, 0x90);
        assert_eq!(part2.ins, 0xAF);
        assert_eq!(part2.le, Some(0x00));

        // The card sees RndA followed by RndB rotated left by one byte
        let data = part2.data.as_ref().unwrap();
        let plain = decrypt(KeyType::Aes128, &key, &[0u8; 16], data);
        assert_eq!(plain[..16], RND_A);
        assert_eq!(plain[16..], hex!("E2FC789B64BF237CCCAA20EC7E6E48B9"));

        let session = handshake
            .complete(&key, &ev2_confirmation(&key, &crypto::rotate_left(&RND_A)))
            .unwrap();
        assert_eq!(handshake.state(), AuthState::SessionEstablished);
        assert_eq!(session.transaction_id(), &hex!("9D00C4DF"));
        assert_eq!(session.command_counter(), 0);
        assert_eq!(session.keys().enc(), hex!("1309C877509E5A215007FF0ED19CA564"));
        assert_eq!(session.keys().mac(), hex!("4C6626F5E72EA694202139295C7A7FC7"));
    }

    #[test]
    fn test_ev2_rejects_unrotated_nonce() {
        let key = [0u8; 16];
        let mut handshake = Handshake::ev2_first(0x00, &AuthConfig::default());
        handshake
            .respond_with_nonce(&key, &challenge(&key), &RND_A)
            .unwrap();

        let result = handshake.complete(&key, &ev2_confirmation(&key, &RND_A));
        assert_eq!(result.err(), Some(Error::AuthenticationFailed));
        assert_eq!(handshake.state(), AuthState::Failed);
        assert!(handshake.pending.is_none());
    }

    #[test]
    fn test_ev2_rejects_wrong_rotation() {
        let key = [0u8; 16];
        let rotated_right = [&RND_A[15..], &RND_A[..15]].concat();
        let rotated_twice = [&RND_A[2..], &RND_A[..2]].concat();

        for proof in [rotated_right, rotated_twice] {
            let mut handshake = Handshake::ev2_first(0x00, &AuthConfig::default());
            handshake
                .respond_with_nonce(&key, &challenge(&key), &RND_A)
                .unwrap();

            let result = handshake.complete(&key, &ev2_confirmation(&key, &proof));
            assert_eq!(result.err(), Some(Error::AuthenticationFailed));
            assert_eq!(handshake.state(), AuthState::Failed);
        }
    }

    #[test]
    fn test_ev2_rejects_status_and_length() {
        let key = [0u8; 16];
        let mut handshake = Handshake::ev2_first(0x00, &AuthConfig::default());
        let response = Response::new(Vec::new(), common::DESFIRE_AUTHENTICATION_ERROR);
        assert!(matches!(
            handshake.respond(&key, &response),
            Err(Error::ProtocolStatus { .. })
        ));
        assert_eq!(handshake.state(), AuthState::Failed);

        let mut handshake = Handshake::ev2_first(0x00, &AuthConfig::default());
        let response = Response::new(vec![0u8; 8], common::DESFIRE_ADDITIONAL_FRAME);
        assert_eq!(
            handshake.respond(&key, &response).err(),
            Some(Error::malformed("unexpected challenge length", 8))
        );
    }

    #[test]
    fn test_out_of_order_steps() {
        let key = [0u8; 16];
        let mut handshake = Handshake::ev2_first(0x00, &AuthConfig::default());
        assert_eq!(
            handshake.complete(&key, &challenge(&key)).err(),
            Some(Error::InvalidState {
                state: AuthState::Idle,
                action: "complete",
            })
        );
    }

    #[test]
    fn test_config_is_applied() {
        let config = AuthConfig::new()
            .with_pcd_capabilities(hex!("010203040506"))
            .with_secondary_application(true);
        let handshake = Handshake::ev2_first(0x02, &config);
        assert_eq!(handshake.key_number(), 0x82);
        assert_eq!(
            handshake.begin().unwrap().to_bytes().as_ref(),
            hex!("90 71 00 00 08 82 06 010203040506 00")
        );
    }

    #[test]
    fn test_legacy_handshake_chains_iv() {
        let key = hex!("00112233445566778899AABBCCDDEEFF");
        let rnd_a = hex!("0001020304050607");
        let rnd_b = hex!("1011121314151617");

        let mut handshake = Handshake::legacy(KeyType::TwoKeyTdes, 0x00, &AuthConfig::default());
        assert_eq!(
            handshake.begin().unwrap().to_bytes().as_ref(),
            hex!("90 1A 00 00 01 00 00")
        );

        let encrypted_rnd_b = encrypt(KeyType::TwoKeyTdes, &key, &[0u8; 8], &rnd_b);
        let part2 = handshake
            .respond_with_nonce(
                &key,
                &Response::new(encrypted_rnd_b.clone(), common::DESFIRE_ADDITIONAL_FRAME),
                &rnd_a,
            )
            .unwrap();

        let data = part2.data.unwrap();
        let plain = decrypt(KeyType::TwoKeyTdes, &key, &encrypted_rnd_b, &data);
        assert_eq!(plain[..8], rnd_a);
        assert_eq!(plain[8..], crypto::rotate_left(&rnd_b)[..]);

        let confirmation = encrypt(
            KeyType::TwoKeyTdes,
            &key,
            &data[8..],
            &crypto::rotate_left(&rnd_a),
        );
        let session = handshake
            .complete(&key, &Response::new(confirmation, common::DESFIRE_OK))
            .unwrap();
        assert_eq!(session.mode(), AuthMode::Legacy(KeyType::TwoKeyTdes));
        assert_eq!(session.keys().enc(), hex!("00010203 10111213 04050607 14151617"));
        assert_eq!(session.transaction_id(), &[0u8; 4]);
        assert_eq!(session.iv(), [0u8; 8]);
    }

    #[test]
    fn test_legacy_rejects_unrotated_nonce() {
        let key = hex!("00112233445566778899AABBCCDDEEFF");
        let rnd_a = hex!("0001020304050607");
        let rnd_b = hex!("1011121314151617");

        let mut handshake = Handshake::legacy(KeyType::TwoKeyTdes, 0x00, &AuthConfig::default());
        let encrypted_rnd_b = encrypt(KeyType::TwoKeyTdes, &key, &[0u8; 8], &rnd_b);
        let part2 = handshake
            .respond_with_nonce(
                &key,
                &Response::new(encrypted_rnd_b, common::DESFIRE_ADDITIONAL_FRAME),
                &rnd_a,
            )
            .unwrap();

        // Correctly chained, but RndA is echoed as is
        let data = part2.data.unwrap();
        let confirmation = encrypt(KeyType::TwoKeyTdes, &key, &data[8..], &rnd_a);
        assert_eq!(
            handshake
                .complete(&key, &Response::new(confirmation, common::DESFIRE_OK))
                .err(),
            Some(Error::AuthenticationFailed)
        );
        assert_eq!(handshake.state(), AuthState::Failed);
        assert!(handshake.pending.is_none());
    }

    #[test]
    fn test_legacy_aes_uses_authenticate_aes() {
        let handshake = Handshake::legacy(KeyType::Aes128, 0x01, &AuthConfig::default());
        assert_eq!(handshake.begin().unwrap().ins, ins::AUTHENTICATE_AES);
    }
}
