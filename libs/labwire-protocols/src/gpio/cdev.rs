//! Character-device GPIO line (`/dev/gpiochipN`)
//!
//! Uses the GPIO v1 line-handle uAPI: one `GPIO_GET_LINEHANDLE_IOCTL` on the
//! chip yields a handle fd owning the line; values are read and written with
//! `GPIOHANDLE_{GET,SET}_LINE_VALUES_IOCTL` on that fd. Closing the handle fd
//! releases the line.

use super::{decode_level, GpioError, OutputLine, Result};
use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use tracing::{debug, info};

/// Consumer label shown by `gpioinfo` for lines we hold
pub const DEFAULT_CONSUMER: &str = "labwire";

const GPIOHANDLES_MAX: usize = 64;
const GPIO_MAX_NAME_SIZE: usize = 32;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;

#[repr(C)]
pub struct GpioHandleRequest {
    lineoffsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    lines: u32,
    fd: i32,
}

#[repr(C)]
pub struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

nix::ioctl_readwrite!(gpio_get_linehandle, 0xB4, 0x03, GpioHandleRequest);
nix::ioctl_readwrite!(gpiohandle_get_line_values, 0xB4, 0x08, GpioHandleData);
nix::ioctl_readwrite!(gpiohandle_set_line_values, 0xB4, 0x09, GpioHandleData);

/// Raw access to a requested line handle
pub trait LineHandle: Send {
    fn read(&mut self) -> std::io::Result<u8>;
    fn write(&mut self, value: u8) -> std::io::Result<()>;
}

/// Kernel line handle obtained through `GPIO_GET_LINEHANDLE_IOCTL`
#[derive(Debug)]
pub struct KernelLineHandle {
    fd: OwnedFd,
}

impl KernelLineHandle {
    /// Request `offset` on `chip_path` as an output driven low.
    pub fn request(chip_path: &Path, offset: u32, consumer: &str) -> std::io::Result<Self> {
        let chip = OpenOptions::new().read(true).write(true).open(chip_path)?;

        let mut request = GpioHandleRequest {
            lineoffsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_OUTPUT,
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            lines: 1,
            fd: -1,
        };
        request.lineoffsets[0] = offset;
        // Keep a trailing NUL
        let label = consumer.as_bytes();
        let len = label.len().min(GPIO_MAX_NAME_SIZE - 1);
        request.consumer_label[..len].copy_from_slice(&label[..len]);

        // SAFETY: `request` is a properly laid out gpiohandle_request and the
        // chip fd stays open for the duration of the call.
        unsafe { gpio_get_linehandle(chip.as_raw_fd(), &mut request) }
            .map_err(std::io::Error::from)?;

        if request.fd < 0 {
            return Err(std::io::Error::other("kernel returned no line handle"));
        }

        // SAFETY: on success the kernel hands us a fresh fd we now own.
        let fd = unsafe { OwnedFd::from_raw_fd(request.fd) };
        Ok(Self { fd })
    }
}

impl LineHandle for KernelLineHandle {
    fn read(&mut self) -> std::io::Result<u8> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        // SAFETY: the handle fd is valid while `self` lives; `data` matches gpiohandle_data.
        unsafe { gpiohandle_get_line_values(self.fd.as_raw_fd(), &mut data) }
            .map_err(std::io::Error::from)?;
        Ok(data.values[0])
    }

    fn write(&mut self, value: u8) -> std::io::Result<()> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        data.values[0] = value;
        // SAFETY: as above.
        unsafe { gpiohandle_set_line_values(self.fd.as_raw_fd(), &mut data) }
            .map_err(std::io::Error::from)?;
        Ok(())
    }
}

/// A GPIO line held through a character-device line handle.
///
/// The handle is dropped (and the line returned to the kernel) on release.
pub struct CdevLine {
    label: String,
    handle: Option<Box<dyn LineHandle>>,
}

impl CdevLine {
    /// Request line `offset` of `{chip_prefix}/gpiochip{chip}` as an output.
    pub fn request(
        chip_prefix: impl AsRef<Path>,
        chip: u32,
        offset: u32,
        consumer: &str,
    ) -> Result<Self> {
        let chip_path = chip_prefix.as_ref().join(format!("gpiochip{}", chip));
        let label = format!("gpiochip{} line {}", chip, offset);

        let handle = KernelLineHandle::request(&chip_path, offset, consumer).map_err(|source| {
            GpioError::Request {
                line: label.clone(),
                source,
            }
        })?;

        info!("Requested {} as output (consumer {:?})", label, consumer);
        Ok(Self::from_handle(label, Box::new(handle)))
    }

    /// Wrap an already requested handle.
    pub fn from_handle(label: impl Into<String>, handle: Box<dyn LineHandle>) -> Self {
        Self {
            label: label.into(),
            handle: Some(handle),
        }
    }

    fn handle(&mut self) -> Result<&mut Box<dyn LineHandle>> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle),
            None => Err(GpioError::Released {
                line: self.label.clone(),
            }),
        }
    }

    fn io_err(&self, source: std::io::Error) -> GpioError {
        GpioError::Io {
            line: self.label.clone(),
            source,
        }
    }
}

impl std::fmt::Debug for CdevLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdevLine")
            .field("label", &self.label)
            .field("requested", &self.handle.is_some())
            .finish()
    }
}

impl OutputLine for CdevLine {
    fn label(&self) -> &str {
        &self.label
    }

    fn set(&mut self, status: bool) -> Result<()> {
        let written = self.handle()?.write(u8::from(status));
        written.map_err(|e| self.io_err(e))?;
        debug!("{} <- {}", self.label, status);
        Ok(())
    }

    fn get(&mut self) -> Result<bool> {
        let raw = self.handle()?.read();
        let raw = raw.map_err(|e| self.io_err(e))?;
        decode_level(&self.label, raw)
    }

    fn release(&mut self) {
        if self.handle.take().is_some() {
            debug!("Released {}", self.label);
        }
    }

    fn is_released(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for CdevLine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::test_utils::FakeLineHandle;

    #[test]
    fn test_handle_request_layout() {
        // gpiohandle_request is 364 bytes on every Linux ABI
        assert_eq!(std::mem::size_of::<GpioHandleRequest>(), 364);
        assert_eq!(std::mem::size_of::<GpioHandleData>(), 64);
    }

    #[test]
    fn test_set_get_round_trip() {
        let fake = FakeLineHandle::new();
        let mut line = CdevLine::from_handle("gpiochip0 line 5", Box::new(fake.checkout()));

        line.set(true).unwrap();
        assert_eq!(fake.level(), 1);
        assert!(line.get().unwrap());

        line.set(false).unwrap();
        assert!(!line.get().unwrap());
    }

    #[test]
    fn test_get_out_of_range() {
        let fake = FakeLineHandle::new();
        fake.force_level(2);
        let mut line = CdevLine::from_handle("gpiochip0 line 5", Box::new(fake));

        let err = line.get().unwrap_err();
        assert!(err.to_string().contains("GPIO value is out of range"));
    }

    #[test]
    fn test_release_drops_handle_once() {
        let fake = FakeLineHandle::new();
        let mut line = CdevLine::from_handle("gpiochip1 line 0", Box::new(fake.checkout()));
        assert!(fake.is_held());

        line.release();
        line.release();
        assert!(line.is_released());
        assert!(!fake.is_held());
        assert!(matches!(line.get(), Err(GpioError::Released { .. })));
    }

    #[test]
    fn test_drop_releases_line() {
        let fake = FakeLineHandle::new();
        {
            let _line = CdevLine::from_handle("gpiochip1 line 2", Box::new(fake.checkout()));
            assert!(fake.is_held());
        }
        assert!(!fake.is_held());
    }

    #[test]
    fn test_request_missing_chip() {
        let dir = tempfile::tempdir().unwrap();
        let result = CdevLine::request(dir.path(), 7, 3, DEFAULT_CONSUMER);
        match result {
            Err(GpioError::Request { line, .. }) => assert_eq!(line, "gpiochip7 line 3"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
