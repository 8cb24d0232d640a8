//! Constants used in SAM AV2 operations

/// Command classes
pub mod cla {
    /// Proprietary class used by every SAM command
    pub const SAM: u8 = 0x80;
}

/// Instruction codes
pub mod ins {
    /// SAM_EncipherData (online, with the card session key)
    pub const ENCIPHER_DATA: u8 = 0xED;
    /// SAM_DecipherData (online, with the card session key)
    pub const DECIPHER_DATA: u8 = 0xDD;
    /// SAM_EncipherOffline_Data
    pub const ENCIPHER_OFFLINE_DATA: u8 = 0x0E;
    /// SAM_DecipherOffline_Data
    pub const DECIPHER_OFFLINE_DATA: u8 = 0x0D;
    /// SAM_GenerateMAC
    pub const GENERATE_MAC: u8 = 0x7C;
    /// SAM_LoadInitVector
    pub const LOAD_INIT_VECTOR: u8 = 0x71;
}

/// P1 chaining markers
pub mod p1 {
    /// More frames follow
    pub const MORE_DATA: u8 = 0xAF;
    /// Last frame of the operation
    pub const LAST_FRAME: u8 = 0x00;
}

/// P2 values
pub mod p2 {
    /// Default P2 for the encipher and decipher commands
    pub const NONE: u8 = 0x00;
    /// SAM_GenerateMAC with the MAC length taken from the key entry
    pub const GENERATE_MAC: u8 = 0x10;
}

/// Largest payload of a single AES frame
pub const AES_FRAME_CEILING: usize = 0xF0;

/// Largest payload of a single DES or 3DES frame
pub const DES_FRAME_CEILING: usize = 0xF8;

/// Shortest input accepted by SAM_DecipherOffline_Data
pub const MIN_DECIPHER_OFFLINE_LENGTH: usize = 8;

/// Length of the online encipher granularity, shared by every algorithm
pub const ONLINE_BLOCK_SIZE: usize = 8;
