//! Modbus-TCP coil client
//!
//! Only the coil functions a relay board needs are implemented:
//! - FC01 Read Coils
//! - FC05 Write Single Coil
//! - FC15 Write Multiple Coils
//!
//! ```text
//! ModbusTcpClient
//!     ├── PduBuilder / ModbusPdu (request and response bodies)
//!     ├── MbapHeader (7-byte TCP framing)
//!     └── ModbusError (transport error code + exception code)
//! ```
//!
//! The client opens a TCP connection for each request and closes it
//! afterwards, so a device that only accepts a single client is never
//! blocked between calls.

mod client;
pub mod constants;
mod error;
mod frame;
mod pdu;

pub use client::{ModbusTcpClient, DEFAULT_TIMEOUT};
pub use constants::{DEFAULT_PORT, DEFAULT_UNIT_ID};
pub use error::{ExceptionCode, ModbusError, Result, TransportErrorCode};
pub use frame::MbapHeader;
pub use pdu::{ModbusPdu, PduBuilder};
