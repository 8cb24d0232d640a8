//! Scripted in-memory transport
//!
//! [`MockTransport`] records every command it is given and answers with
//! pre-loaded responses in order. It is meant for unit tests of the protocol
//! crates and is only compiled with the `mock` feature.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::transport::{CardTransport, TransportError};

/// Transport that replays scripted responses
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Responses still to be returned, front first
    responses: VecDeque<Bytes>,
    /// Commands that were sent
    commands: Vec<Bytes>,
    /// When set, every exchange fails with this error
    failure: Option<TransportError>,
}

impl MockTransport {
    /// Create a new mock transport with the given responses
    pub fn new<I, B>(responses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create a mock transport that fails every exchange with `error`
    pub fn failing(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Default::default()
        }
    }

    /// Queue another response
    pub fn push_response(&mut self, response: impl Into<Bytes>) {
        self.responses.push_back(response.into());
    }

    /// Commands sent so far, in order
    pub fn commands(&self) -> &[Bytes] {
        &self.commands
    }

    /// Number of responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.commands.push(Bytes::copy_from_slice(command));

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        self.responses
            .pop_front()
            .ok_or(TransportError::Transmission)
    }
}
