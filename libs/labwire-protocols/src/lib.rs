//! labwire hardware backends
//!
//! Each backend drives one physical output and knows nothing about where its
//! caller lives:
//!
//! ```text
//! labwire-protocols
//!     ├── gpio
//!     │   ├── SysfsLine   (/sys/class/gpio/gpioN/value)
//!     │   └── CdevLine    (/dev/gpiochipN line handle, GPIO v1 uAPI)
//!     └── modbus
//!         ├── ModbusPdu / PduBuilder
//!         ├── MbapHeader (TCP framing)
//!         └── ModbusTcpClient (FC01 / FC05 / FC15, auto open/close)
//! ```
//!
//! Dispatch, ownership and inversion live one layer up in `labwire-core`.

pub mod gpio;
pub mod modbus;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
