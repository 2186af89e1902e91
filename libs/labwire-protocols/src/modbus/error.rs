//! Modbus client error model
//!
//! Every failed request records a transport error code and, for exception
//! responses, the exception code sent by the device. The numbering follows
//! the common Modbus-TCP client convention so codes read the same in logs
//! from any tool.

use std::fmt;
use thiserror::Error;

/// Why the last request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportErrorCode {
    None = 0,
    Resolve = 1,
    Connect = 2,
    Send = 3,
    Recv = 4,
    Timeout = 5,
    Frame = 6,
    Exception = 7,
    Crc = 8,
    SocketClosed = 9,
}

impl TransportErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::None => "no error",
            Self::Resolve => "name resolve error",
            Self::Connect => "connect error",
            Self::Send => "socket send error",
            Self::Recv => "socket recv error",
            Self::Timeout => "recv timeout occur",
            Self::Frame => "frame format error",
            Self::Exception => "modbus exception",
            Self::Crc => "bad CRC on receive frame",
            Self::SocketClosed => "socket is closed",
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Modbus exception code carried in an exception response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    None,
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    NegativeAcknowledge,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetNoResponse,
    Other(u8),
}

impl ExceptionCode {
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::IllegalFunction => 1,
            Self::IllegalDataAddress => 2,
            Self::IllegalDataValue => 3,
            Self::SlaveDeviceFailure => 4,
            Self::Acknowledge => 5,
            Self::SlaveDeviceBusy => 6,
            Self::NegativeAcknowledge => 7,
            Self::MemoryParityError => 8,
            Self::GatewayPathUnavailable => 10,
            Self::GatewayTargetNoResponse => 11,
            Self::Other(code) => code,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::None => "no exception",
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::SlaveDeviceFailure => "slave device failure",
            Self::Acknowledge => "acknowledge",
            Self::SlaveDeviceBusy => "slave device busy",
            Self::NegativeAcknowledge => "negative acknowledge",
            Self::MemoryParityError => "memory parity error",
            Self::GatewayPathUnavailable => "gateway path unavailable",
            Self::GatewayTargetNoResponse => "gateway target device failed to respond",
            Self::Other(_) => "unknown exception",
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::IllegalFunction,
            2 => Self::IllegalDataAddress,
            3 => Self::IllegalDataValue,
            4 => Self::SlaveDeviceFailure,
            5 => Self::Acknowledge,
            6 => Self::SlaveDeviceBusy,
            7 => Self::NegativeAcknowledge,
            8 => Self::MemoryParityError,
            10 => Self::GatewayPathUnavailable,
            11 => Self::GatewayTargetNoResponse,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// A failed Modbus request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Modbus error {code}: {message}")]
pub struct ModbusError {
    pub code: TransportErrorCode,
    pub exception: ExceptionCode,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, ModbusError>;

impl ModbusError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            exception: ExceptionCode::None,
            message: message.into(),
        }
    }

    /// Exception response from the device
    pub fn exception(function_code: u8, exception: ExceptionCode) -> Self {
        Self {
            code: TransportErrorCode::Exception,
            exception,
            message: format!(
                "FC{:02X} answered with exception {}",
                function_code, exception
            ),
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::Frame, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::Timeout, message)
    }

    /// Classify a socket error seen while sending or receiving.
    pub fn from_io(code: TransportErrorCode, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => {
                Self::new(TransportErrorCode::SocketClosed, err.to_string())
            }
            _ => Self::new(code, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_mapping() {
        assert_eq!(ExceptionCode::from(2), ExceptionCode::IllegalDataAddress);
        assert_eq!(ExceptionCode::from(5), ExceptionCode::Acknowledge);
        assert_eq!(ExceptionCode::from(9), ExceptionCode::Other(9));
        assert_eq!(ExceptionCode::GatewayTargetNoResponse.code(), 11);
    }

    #[test]
    fn test_exception_error() {
        let err = ModbusError::exception(0x05, ExceptionCode::IllegalDataAddress);
        assert_eq!(err.code, TransportErrorCode::Exception);
        assert_eq!(err.code.code(), 7);
        assert!(err.to_string().contains("illegal data address"));
    }

    #[test]
    fn test_eof_is_socket_closed() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = ModbusError::from_io(TransportErrorCode::Recv, &io);
        assert_eq!(err.code, TransportErrorCode::SocketClosed);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = ModbusError::from_io(TransportErrorCode::Send, &io);
        assert_eq!(err.code, TransportErrorCode::Send);
    }
}
