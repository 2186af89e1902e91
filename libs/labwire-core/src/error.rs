//! Dispatch error taxonomy
//!
//! The same enum travels over the agent connection, so a failure raised on a
//! remote agent reaches the caller as the variant it would have been locally.

use labwire_protocols::gpio::GpioError;
use labwire_protocols::modbus::{ExceptionCode, ModbusError, TransportErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What a coil request was trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoilAction {
    Read,
    Write,
}

impl fmt::Display for CoilAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoilAction::Read => f.write_str("read"),
            CoilAction::Write => f.write_str("write"),
        }
    }
}

/// A failed coil read or write, decoded from the Modbus client state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoilProtocolError {
    pub action: CoilAction,
    /// Transport error code of the failed request
    pub code: u8,
    /// Exception code, when the device answered with a reportable exception
    pub exception: Option<u8>,
    pub message: String,
}

impl CoilProtocolError {
    /// Decode a failed request.
    ///
    /// An exception response carries its exception code unless that code is
    /// `none` or `acknowledge`; every other failure carries the transport code
    /// alone.
    pub fn decode(action: CoilAction, code: TransportErrorCode, exception: ExceptionCode) -> Self {
        let reportable = code == TransportErrorCode::Exception
            && !matches!(exception, ExceptionCode::None | ExceptionCode::Acknowledge);

        let message = if reportable {
            format!(
                "Could not {} coil (code={}/exception={})",
                action,
                code.code(),
                exception.code()
            )
        } else {
            format!("Could not {} coil (code={})", action, code.code())
        };

        Self {
            action,
            code: code.code(),
            exception: reportable.then(|| exception.code()),
            message,
        }
    }

    pub fn from_modbus(action: CoilAction, err: &ModbusError) -> Self {
        Self::decode(action, err.code, err.exception)
    }
}

impl fmt::Display for CoilProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CoilProtocolError {}

/// Errors surfaced by drivers and the dispatch proxy
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    /// Invalid descriptor or unsupported binding, detected before any I/O
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Backend could not be attached or the agent could not be reached
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Coil read/write failed
    #[error("Protocol error: {0}")]
    Protocol(CoilProtocolError),

    /// GPIO line could not be acquired or reported an invalid value
    #[error("Device error: {message}")]
    Device { message: String },

    /// Operation not valid in the driver's current state
    #[error("Lifecycle error: {message}")]
    Lifecycle { message: String },
}

pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DispatchError::Configuration {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        DispatchError::Connection {
            message: message.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        DispatchError::Device {
            message: message.into(),
        }
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        DispatchError::Lifecycle {
            message: message.into(),
        }
    }

    /// Short kind name, as used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Configuration { .. } => "configuration",
            DispatchError::Connection { .. } => "connection",
            DispatchError::Protocol(_) => "protocol",
            DispatchError::Device { .. } => "device",
            DispatchError::Lifecycle { .. } => "lifecycle",
        }
    }
}

impl From<GpioError> for DispatchError {
    fn from(err: GpioError) -> Self {
        DispatchError::device(err.to_string())
    }
}

impl From<CoilProtocolError> for DispatchError {
    fn from(err: CoilProtocolError) -> Self {
        DispatchError::Protocol(err)
    }
}

impl From<labwire_common::Error> for DispatchError {
    fn from(err: labwire_common::Error) -> Self {
        DispatchError::configuration(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_exception_with_subcode() {
        let err = CoilProtocolError::decode(
            CoilAction::Write,
            TransportErrorCode::Exception,
            ExceptionCode::IllegalDataAddress,
        );
        assert_eq!(err.code, 7);
        assert_eq!(err.exception, Some(2));
        assert!(err.message.contains("write"));
    }

    #[test]
    fn test_decode_acknowledge_drops_subcode() {
        let err = CoilProtocolError::decode(
            CoilAction::Read,
            TransportErrorCode::Exception,
            ExceptionCode::Acknowledge,
        );
        assert_eq!(err.code, 7);
        assert_eq!(err.exception, None);
    }

    #[test]
    fn test_decode_transport_failure() {
        let err = CoilProtocolError::decode(
            CoilAction::Read,
            TransportErrorCode::Timeout,
            ExceptionCode::None,
        );
        assert_eq!(err.code, 5);
        assert_eq!(err.exception, None);
        assert_eq!(err.action, CoilAction::Read);
    }

    #[test]
    fn test_error_descriptor_serialization() {
        let err = DispatchError::Protocol(CoilProtocolError::decode(
            CoilAction::Write,
            TransportErrorCode::Exception,
            ExceptionCode::SlaveDeviceBusy,
        ));

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "protocol");
        assert_eq!(json["action"], "write");
        assert_eq!(json["exception"], 6);

        let back: DispatchError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_gpio_error_is_device_error() {
        let gpio = GpioError::OutOfRange {
            line: "gpio4".to_string(),
            raw: "x".to_string(),
        };
        let err: DispatchError = gpio.into();
        assert_eq!(err.kind(), "device");
        assert!(err.to_string().contains("out of range"));
    }
}
