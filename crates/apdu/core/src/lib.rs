//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for working with smart card
//! APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! The MIFARE protocol crates in this workspace consume a single blocking
//! request/response primitive and a status word classifier. This crate provides:
//!
//! - Creating and parsing APDU commands and responses
//! - The [`CardTransport`] trait that concrete readers implement
//! - Status word interpretation, including the DESFire (`91 XX`) and SAM
//!   (`90 AF`) command chaining codes
//! - A scripted in-memory transport behind the `mock` feature
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod response;
pub mod transport;

pub use command::{ApduCommand, Command, ExpectedLength, error::CommandError};
pub use response::error::ResponseError;
pub use response::status::{StatusClass, StatusWord};
pub use response::Response;
pub use transport::{CardTransport, TransportError};
