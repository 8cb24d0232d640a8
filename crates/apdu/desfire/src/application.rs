//! DESFire application implementation
//!
//! This module provides the main DESFire interface, which drives the
//! authentication handshakes over a transport and protects subsequent
//! commands with the resulting session.

use nexum_apdu_core::{ApduCommand, CardTransport, Command, Response};
use tracing::{debug, warn};

use crate::{
    Error, Result,
    auth::Handshake,
    commands,
    config::AuthConfig,
    crypto::KeyType,
    secure_messaging::CommMode,
    session::Session,
};

/// DESFire card driven through a transport
#[derive(Debug)]
pub struct Desfire<T: CardTransport> {
    /// Card transport
    transport: T,
    /// Authentication options
    config: AuthConfig,
    /// Application the next sessions are bound to
    application_id: [u8; 3],
    /// Current session
    session: Option<Session>,
}

impl<T: CardTransport> Desfire<T> {
    /// Create a new DESFire instance with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, AuthConfig::default())
    }

    /// Create a new DESFire instance with the given configuration
    pub const fn with_config(transport: T, config: AuthConfig) -> Self {
        Self {
            transport,
            config,
            application_id: [0u8; 3],
            session: None,
        }
    }

    /// Record the application context for subsequent sessions
    pub const fn with_application(mut self, application_id: [u8; 3]) -> Self {
        self.application_id = application_id;
        self
    }

    /// Change the application context
    ///
    /// Any established session belongs to the previous application and is
    /// discarded.
    pub fn set_application(&mut self, application_id: [u8; 3]) {
        self.application_id = application_id;
        self.close_session();
    }

    /// Application context
    pub const fn application_id(&self) -> &[u8; 3] {
        &self.application_id
    }

    /// Authentication options
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Current session, if authenticated
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Check whether a session is established
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the current session, wiping its keys
    pub fn close_session(&mut self) {
        if self.session.take().is_some() {
            debug!("Session closed");
        }
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

    /// Authenticate with AuthenticateEV2First using an AES-128 key
    pub fn authenticate_ev2_first(&mut self, key_number: u8, key: &[u8]) -> Result<()> {
        let handshake = Handshake::ev2_first(key_number, &self.config);
        self.authenticate(handshake, key)
    }

    /// Authenticate with the EV1 handshake for the given key type
    pub fn authenticate_iso(
        &mut self,
        key_type: KeyType,
        key_number: u8,
        key: &[u8],
    ) -> Result<()> {
        let handshake = Handshake::legacy(key_type, key_number, &self.config);
        self.authenticate(handshake, key)
    }

    fn authenticate(&mut self, mut handshake: Handshake, key: &[u8]) -> Result<()> {
        // A new handshake invalidates the previous session whatever its outcome
        self.close_session();

        debug!(
            mode = %handshake.mode(),
            key_number = handshake.key_number(),
            "Starting authentication"
        );

        let part1 = handshake.begin()?;
        let challenge = self.exchange(&part1)?;
        let part2 = handshake.respond(key, &challenge)?;
        let confirmation = self.exchange(&part2)?;
        let session = handshake.complete(key, &confirmation)?;

        self.session = Some(session.with_application(self.application_id));
        Ok(())
    }

    fn exchange(&mut self, command: &Command) -> Result<Response> {
        let raw = self.transport.transmit_raw(&command.to_bytes())?;
        parse_response(&raw)
    }

    /// Send a native command protected by the current session
    ///
    /// `header` is sent in the clear, `data` is protected according to
    /// `mode`. Returns the unprotected response data.
    pub fn transceive(
        &mut self,
        cmd: u8,
        header: &[u8],
        data: &[u8],
        mode: CommMode,
    ) -> Result<Vec<u8>> {
        let session = self.session.as_mut().ok_or(Error::NotAuthenticated)?;
        let body = session.wrap_command(cmd, header, data, mode)?;
        let command = commands::native(cmd, &body)?;

        let raw = match self.transport.transmit_raw(&command.to_bytes()) {
            Ok(raw) => raw,
            Err(e) => {
                // Card and host may now disagree on the counter
                self.close_session();
                return Err(e.into());
            }
        };

        let session = self.session.as_mut().ok_or(Error::NotAuthenticated)?;
        session.advance_counter()?;

        let response = parse_response(&raw)?;
        if !response.is_success() {
            warn!(
                cmd = format_args!("{cmd:#04x}"),
                status = %response.status(),
                "Command failed"
            );
            return Err(Error::status(response.status()));
        }

        session.unwrap_response(response.status().sw2, response.payload(), mode)
    }
}

fn parse_response(raw: &[u8]) -> Result<Response> {
    Response::from_bytes(raw)
        .map_err(|_| Error::malformed("response shorter than a status word", raw.len()))
}
