//! MIFARE DESFire authentication and secure messaging
//!
//! This crate provides the mutual authentication handshakes for DESFire EV2
//! (AuthenticateEV2First) and EV1 (AuthenticateISO, AuthenticateAES) cards,
//! and the secure messaging session they produce.
//!
//! The main entry point is the `Desfire` struct, which drives a handshake over
//! a [`CardTransport`](nexum_apdu_core::CardTransport) and protects subsequent
//! commands with the resulting session. The handshake itself is available as
//! the sans-IO [`Handshake`] state machine.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod application;
pub mod auth;
pub mod commands;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod secure_messaging;
pub mod session;

// Re-exports
pub use application::Desfire;
pub use auth::{AuthMode, AuthState, Handshake};
pub use config::AuthConfig;
pub use crypto::KeyType;
pub use error::{Error, Result};
pub use secure_messaging::CommMode;
pub use session::{Session, SessionKeys};
