//! Session management for DESFire secure messaging
//!
//! A [`Session`] only exists after a successful authentication. It holds the
//! derived session keys, the transaction identifier, the command counter and
//! the IV state. Everything is wiped when the session is dropped.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    Error, Result,
    auth::AuthMode,
    constants::{CAPABILITY_LENGTH, TRANSACTION_ID_LENGTH},
};

/// Derived session keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Encryption key (KSesAuthENC)
    enc: Vec<u8>,
    /// MAC key (KSesAuthMAC)
    mac: Vec<u8>,
}

impl SessionKeys {
    pub(crate) const fn new(enc: Vec<u8>, mac: Vec<u8>) -> Self {
        Self { enc, mac }
    }

    /// Get the encryption key
    pub fn enc(&self) -> &[u8] {
        &self.enc
    }

    /// Get the MAC key
    pub fn mac(&self) -> &[u8] {
        &self.mac
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Authenticated secure messaging state
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    /// Handshake variant that produced this session
    #[zeroize(skip)]
    mode: AuthMode,
    /// Session keys
    keys: SessionKeys,
    /// Transaction identifier returned by the card, zero for EV1 sessions
    transaction_id: [u8; TRANSACTION_ID_LENGTH],
    /// Command counter
    command_counter: u16,
    /// Current IV
    pub(crate) iv: Vec<u8>,
    /// Key slot the session was authenticated with
    key_number: u8,
    /// Application the session is bound to
    application_id: [u8; 3],
    /// Capabilities sent by the host (EV2 only)
    pcd_capabilities: Option<[u8; CAPABILITY_LENGTH]>,
    /// Capabilities returned by the card (EV2 only)
    pd_capabilities: Option<[u8; CAPABILITY_LENGTH]>,
}

impl Session {
    /// Create an EV2 session
    pub(crate) fn ev2(
        keys: SessionKeys,
        transaction_id: [u8; TRANSACTION_ID_LENGTH],
        key_number: u8,
        pcd_capabilities: [u8; CAPABILITY_LENGTH],
        pd_capabilities: [u8; CAPABILITY_LENGTH],
    ) -> Self {
        Self {
            mode: AuthMode::Ev2First,
            keys,
            transaction_id,
            command_counter: 0,
            iv: vec![0u8; 16],
            key_number,
            application_id: [0u8; 3],
            pcd_capabilities: Some(pcd_capabilities),
            pd_capabilities: Some(pd_capabilities),
        }
    }

    /// Create an EV1 session, the chaining IV starts at zero
    pub(crate) fn legacy(mode: AuthMode, keys: SessionKeys, key_number: u8) -> Self {
        Self {
            mode,
            keys,
            transaction_id: [0u8; TRANSACTION_ID_LENGTH],
            command_counter: 0,
            iv: vec![0u8; mode.key_type().block_size()],
            key_number,
            application_id: [0u8; 3],
            pcd_capabilities: None,
            pd_capabilities: None,
        }
    }

    /// Bind the session to an application
    pub(crate) const fn with_application(mut self, application_id: [u8; 3]) -> Self {
        self.application_id = application_id;
        self
    }

    /// Handshake variant that produced this session
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Session keys
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Transaction identifier
    pub const fn transaction_id(&self) -> &[u8; TRANSACTION_ID_LENGTH] {
        &self.transaction_id
    }

    /// Current command counter
    pub const fn command_counter(&self) -> u16 {
        self.command_counter
    }

    /// Current IV
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Key slot the session was authenticated with
    pub const fn key_number(&self) -> u8 {
        self.key_number
    }

    /// Application the session is bound to
    pub const fn application_id(&self) -> &[u8; 3] {
        &self.application_id
    }

    /// Capabilities sent by the host
    pub const fn pcd_capabilities(&self) -> Option<&[u8; CAPABILITY_LENGTH]> {
        self.pcd_capabilities.as_ref()
    }

    /// Capabilities returned by the card
    pub const fn pd_capabilities(&self) -> Option<&[u8; CAPABILITY_LENGTH]> {
        self.pd_capabilities.as_ref()
    }

    /// Fail once the counter has reached its limit
    pub const fn ensure_usable(&self) -> Result<()> {
        if self.command_counter == u16::MAX {
            return Err(Error::CounterExhausted);
        }
        Ok(())
    }

    /// Advance the command counter by exactly one
    ///
    /// Once the counter reaches `u16::MAX` no further command can be protected
    /// and the caller has to authenticate again.
    pub fn advance_counter(&mut self) -> Result<u16> {
        self.command_counter = self
            .command_counter
            .checked_add(1)
            .ok_or(Error::CounterExhausted)?;
        Ok(self.command_counter)
    }

    #[cfg(test)]
    pub(crate) const fn set_command_counter(&mut self, value: u16) {
        self.command_counter = value;
    }
}
