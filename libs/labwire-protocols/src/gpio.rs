//! GPIO output lines
//!
//! A line is requested once and then driven through [`OutputLine`] until it
//! is released. Two kernel interfaces are supported:
//! - [`SysfsLine`] for the legacy `/sys/class/gpio` interface
//! - [`CdevLine`] for `/dev/gpiochipN` line handles

mod cdev;
mod sysfs;

pub use cdev::{CdevLine, KernelLineHandle, LineHandle, DEFAULT_CONSUMER};
pub use sysfs::{SysfsLine, DEFAULT_SYSFS_PREFIX};

use thiserror::Error;

/// GPIO backend errors
#[derive(Error, Debug)]
pub enum GpioError {
    /// The line could not be exported or requested
    #[error("Failed to request {line}: {source}")]
    Request {
        line: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the line failed after it was requested
    #[error("I/O error on {line}: {source}")]
    Io {
        line: String,
        #[source]
        source: std::io::Error,
    },

    /// The line reported something other than 0 or 1
    #[error("GPIO value is out of range on {line}: {raw:?}")]
    OutOfRange { line: String, raw: String },

    /// The line was used after release
    #[error("{line} has been released")]
    Released { line: String },
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// A requested GPIO output line.
///
/// `release` is idempotent; dropping a line releases it as well.
pub trait OutputLine: Send {
    /// Human-readable line identity, used in logs and errors
    fn label(&self) -> &str;

    /// Drive the line: `true` writes 1, `false` writes 0
    fn set(&mut self, status: bool) -> Result<()>;

    /// Read the current line level
    fn get(&mut self) -> Result<bool>;

    /// Give the line back to the kernel
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// Decode a raw line level. Anything but 0/1 is out of range.
pub(crate) fn decode_level(line: &str, raw: u8) -> Result<bool> {
    match raw {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(GpioError::OutOfRange {
            line: line.to_string(),
            raw: format!("{:#04x}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_level() {
        assert!(!decode_level("gpio1", 0).unwrap_or(true));
        assert!(decode_level("gpio1", 1).unwrap_or(false));
        let err = decode_level("gpio1", b'1');
        assert!(matches!(err, Err(GpioError::OutOfRange { .. })));
    }
}
