//! Status words returned by DESFire cards and SAM AV2 modules
//!
//! DESFire native commands wrapped in ISO frames answer `91 XX`, where `XX`
//! is the native status byte. The SAM answers ISO 7816-4 status words and
//! uses `90 AF` to ask for the next frame of a chained command.

use std::fmt;

/// Coarse classification of a status word for chained MIFARE exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// The command completed (`90 00` or DESFire `91 00`)
    Success,
    /// The device expects or offers another frame (`90 AF` or DESFire `91 AF`)
    MoreFrames,
    /// Any other status, including codes this crate does not know about
    Error,
}

/// SW1 SW2 trailer of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte
    pub sw1: u8,
    /// Second status byte, the native status for DESFire
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Both bytes as a big-endian `u16`
    pub const fn to_u16(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    /// Classify this status word
    pub const fn class(&self) -> StatusClass {
        match (self.sw1, self.sw2) {
            (0x90 | 0x91, 0x00) => StatusClass::Success,
            (0x90 | 0x91, 0xAF) => StatusClass::MoreFrames,
            _ => StatusClass::Error,
        }
    }

    /// `90 00` or `91 00`
    pub const fn is_success(&self) -> bool {
        matches!(self.class(), StatusClass::Success)
    }

    /// `90 AF` or `91 AF`
    pub const fn is_more_frames(&self) -> bool {
        matches!(self.class(), StatusClass::MoreFrames)
    }

    /// DESFire native status wrapped in an ISO response (`91 XX`)
    pub const fn is_desfire(&self) -> bool {
        self.sw1 == 0x91
    }

    /// Human readable meaning, for logs and error messages
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x91, native) => desfire_description(native),
            (0x90, 0x00) => "Success",
            (0x90, 0xAF) => "Correct execution, more data expected",
            (0x90, 0x1E) => "Correct execution, authentication failed",
            // SAM AV2
            (0x63, 0x00) => "MAC verification failed",
            (0x65, 0x81) => "Memory failure",
            (0x67, 0x00) => "Wrong length",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x84) => "Referenced key invalid or disabled",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x6A, 0x80) => "Incorrect data field",
            (0x6A, 0x82) => "Key entry not found",
            (0x6A, 0x84) => "Key version not found",
            (0x6B, 0x00) => "Wrong P1 or P2",
            (0x6D, 0x00) => "Instruction not supported",
            (0x6E, 0x00) => "Class not supported",
            _ => "Unknown status word",
        }
    }
}

const fn desfire_description(native: u8) -> &'static str {
    match native {
        0x00 => "Successful operation",
        0x0C => "No changes done to backup files",
        0x0E => "Insufficient NV memory to complete command",
        0x1C => "Command code not supported",
        0x1E => "CRC or MAC does not match data",
        0x40 => "Invalid key number specified",
        0x7E => "Length of command string invalid",
        0x9D => "Current configuration or status does not allow the command",
        0x9E => "Value of the parameter(s) invalid",
        0xA0 => "Requested application not present",
        0xA1 => "Unrecoverable error within application",
        0xAE => "Current authentication status does not allow the command",
        0xAF => "Additional data frame expected",
        0xBE => "Attempt to read or write beyond the file limits",
        0xC1 => "Unrecoverable error within PICC",
        0xCA => "Previous command was not fully completed",
        0xCD => "PICC was disabled by an unrecoverable error",
        0xCE => "Number of applications limited to 28",
        0xDE => "Application or file with that identifier already exists",
        0xEE => "Could not complete NV write operation",
        0xF0 => "Specified file number does not exist",
        0xF1 => "Unrecoverable error within file",
        _ => "Unknown DESFire status",
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Status words the protocol crates match on
pub mod common {
    use super::StatusWord;

    /// ISO success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// SAM chaining, more data expected (90 AF)
    pub const MORE_FRAMES: StatusWord = StatusWord::new(0x90, 0xAF);

    /// DESFire operation ok (91 00)
    pub const DESFIRE_OK: StatusWord = StatusWord::new(0x91, 0x00);

    /// DESFire additional frame (91 AF)
    pub const DESFIRE_ADDITIONAL_FRAME: StatusWord = StatusWord::new(0x91, 0xAF);

    /// DESFire authentication error (91 AE)
    pub const DESFIRE_AUTHENTICATION_ERROR: StatusWord = StatusWord::new(0x91, 0xAE);

    /// DESFire integrity error (91 1E)
    pub const DESFIRE_INTEGRITY_ERROR: StatusWord = StatusWord::new(0x91, 0x1E);

    /// SAM wrong length (67 00)
    pub const WRONG_LENGTH: StatusWord = StatusWord::new(0x67, 0x00);
}
