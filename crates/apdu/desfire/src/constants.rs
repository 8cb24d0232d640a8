//! Constants used in DESFire operations
//!
//! Command classes, native instruction codes, derivation labels and field
//! lengths used by the authentication and secure messaging layers.

/// Command classes
pub mod cla {
    /// ISO/IEC 7816-4 wrapping of native DESFire commands
    pub const ISO_WRAPPED: u8 = 0x90;
}

/// Native DESFire instruction codes
pub mod ins {
    /// AuthenticateEV2First
    pub const AUTHENTICATE_EV2_FIRST: u8 = 0x71;
    /// AuthenticateISO (2K3DES and 3K3DES)
    pub const AUTHENTICATE_ISO: u8 = 0x1A;
    /// AuthenticateAES (EV1)
    pub const AUTHENTICATE_AES: u8 = 0xAA;
    /// Additional frame, used for the second authentication step
    pub const ADDITIONAL_FRAME: u8 = 0xAF;
}

/// Labels for EV2 session vector and IV construction
pub mod label {
    /// Session vector 1 prefix (encryption key)
    pub const SV_ENC: [u8; 2] = [0xA5, 0x5A];
    /// Session vector 2 prefix (MAC key)
    pub const SV_MAC: [u8; 2] = [0x5A, 0xA5];
    /// Counter and length fields shared by both session vectors
    pub const SV_COUNTER_LENGTH: [u8; 4] = [0x00, 0x01, 0x00, 0x80];
    /// Command IV prefix
    pub const IV_COMMAND: [u8; 2] = [0xA5, 0x5A];
    /// Response IV prefix
    pub const IV_RESPONSE: [u8; 2] = [0x5A, 0xA5];
}

/// Length of the EV2 transaction identifier
pub const TRANSACTION_ID_LENGTH: usize = 4;

/// Length of the EV2 capability fields (PDcap2 and PCDcap2)
pub const CAPABILITY_LENGTH: usize = 6;

/// Length of the EV2 authentication confirmation (TI, RndA', PDcap2, PCDcap2)
pub const EV2_CONFIRMATION_LENGTH: usize = TRANSACTION_ID_LENGTH + 16 + 2 * CAPABILITY_LENGTH;

/// Length of a truncated secure messaging MAC
pub const MAC_LENGTH: usize = 8;

/// Length of the DESFire CRC32
pub const CRC32_LENGTH: usize = 4;

/// Key number flag selecting the secondary application key set
pub const SECONDARY_APPLICATION_FLAG: u8 = 0x80;
