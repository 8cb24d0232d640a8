//! Configuration options for DESFire authentication

use crate::constants::CAPABILITY_LENGTH;

/// Configuration options for authentication handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthConfig {
    /// Capability bytes (PCDcap2) offered by the host in EV2 authentication
    ///
    /// Sent as `LenCap || PCDcap2` in the first AuthenticateEV2First frame,
    /// after the key number. `LenCap` is 0 when unset.
    pub pcd_capabilities: Option<[u8; CAPABILITY_LENGTH]>,

    /// Authenticate against the secondary application key set
    pub secondary_application: bool,
}

impl AuthConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host capability bytes
    pub const fn with_pcd_capabilities(mut self, capabilities: [u8; CAPABILITY_LENGTH]) -> Self {
        self.pcd_capabilities = Some(capabilities);
        self
    }

    /// Set whether to use the secondary application key set
    pub const fn with_secondary_application(mut self, secondary: bool) -> Self {
        self.secondary_application = secondary;
        self
    }
}
