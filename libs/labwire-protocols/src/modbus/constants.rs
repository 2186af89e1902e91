//! Modbus protocol constants

/// Registered Modbus-TCP port
pub const DEFAULT_PORT: u16 = 502;

/// Unit identifier used when none is configured
pub const DEFAULT_UNIT_ID: u8 = 1;

/// MBAP header length including the unit identifier
pub const MBAP_HEADER_LEN: usize = 7;

/// Maximum PDU size (function code + data)
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum coils per FC01 request
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum coils per FC15 request
pub const MAX_WRITE_COILS: u16 = 1968;

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Exception responses set the high bit of the function code
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;
