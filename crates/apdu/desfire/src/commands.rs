//! DESFire command frames
//!
//! Native DESFire commands are sent wrapped in ISO/IEC 7816-4 APDUs:
//! `90 CMD 00 00 [Lc data] 00`.

use nexum_apdu_core::Command;

use crate::{
    Result,
    constants::{cla, ins},
};

/// Wrap a native command and its data in an ISO/IEC 7816-4 APDU
pub fn native(cmd: u8, data: &[u8]) -> Result<Command> {
    let command = if data.is_empty() {
        Command::new(cla::ISO_WRAPPED, cmd, 0x00, 0x00)
    } else {
        Command::try_new_with_data(cla::ISO_WRAPPED, cmd, 0x00, 0x00, data.to_vec())?
    };
    Ok(command.with_le(0x00))
}

/// First frame of AuthenticateEV2First
///
/// When `capabilities` is given it is sent as PCDcap2 with its length,
/// otherwise the length byte is zero.
pub fn authenticate_ev2_first(key_number: u8, capabilities: Option<&[u8]>) -> Result<Command> {
    let caps = capabilities.unwrap_or_default();
    let mut data = Vec::with_capacity(2 + caps.len());
    data.push(key_number);
    data.push(caps.len() as u8);
    data.extend_from_slice(caps);
    native(ins::AUTHENTICATE_EV2_FIRST, &data)
}

/// First frame of a legacy authentication (AuthenticateISO or AuthenticateAES)
pub fn authenticate_legacy(instruction: u8, key_number: u8) -> Result<Command> {
    native(instruction, &[key_number])
}

/// Additional frame carrying the next part of a chained exchange
pub fn additional_frame(data: &[u8]) -> Result<Command> {
    native(ins::ADDITIONAL_FRAME, data)
}
