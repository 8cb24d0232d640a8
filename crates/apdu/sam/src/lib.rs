//! MIFARE SAM AV2 cryptographic operations
//!
//! This crate translates logical SAM requests (encipher, decipher, MAC,
//! IV loading) into chained command frames that respect the per-algorithm
//! payload ceiling, and reassembles the chained responses.
//!
//! The main entry point is the `Sam` struct. Frame planning is available on
//! its own through [`commands::plan`] for callers that drive the transport
//! themselves.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod algorithm;
pub mod commands;
pub mod constants;
pub mod error;
pub mod fragment;
pub mod sam;

// Re-exports
pub use algorithm::CryptoAlgorithm;
pub use commands::SamOperation;
pub use error::{Error, Result};
pub use fragment::{Fragment, fragment};
pub use sam::Sam;
