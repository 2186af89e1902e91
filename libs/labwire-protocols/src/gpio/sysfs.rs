//! Sysfs GPIO line (`/sys/class/gpio`)
//!
//! Requesting a line exports it when `gpioN` is missing, switches it to
//! output only when it is not already an output, then keeps `value` open
//! until release.

use super::{GpioError, OutputLine, Result};
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_SYSFS_PREFIX: &str = "/sys/class/gpio";

/// One exported sysfs GPIO line held open for writing
#[derive(Debug)]
pub struct SysfsLine {
    index: u32,
    label: String,
    value: Option<File>,
}

impl SysfsLine {
    /// Export (if needed) and request `gpio{index}` below `base_path` as an output.
    pub fn request(base_path: impl AsRef<Path>, index: u32) -> Result<Self> {
        let base_path = base_path.as_ref();
        let label = format!("sysfs gpio{}", index);
        let gpio_path = base_path.join(format!("gpio{}", index));
        let request_err = |source: std::io::Error| GpioError::Request {
            line: label.clone(),
            source,
        };

        if !gpio_path.exists() {
            debug!("Exporting GPIO {} via {}", index, base_path.display());
            std::fs::write(base_path.join("export"), index.to_string().as_bytes())
                .map_err(request_err)?;
        }

        let direction_path = gpio_path.join("direction");
        let direction = std::fs::read_to_string(&direction_path).map_err(request_err)?;
        if !direction.starts_with("ou") {
            debug!("Switching GPIO {} direction to out", index);
            std::fs::write(&direction_path, b"out").map_err(request_err)?;
        }

        let value = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_SYNC.bits())
            .open(value_path(base_path, index))
            .map_err(request_err)?;

        info!("Requested GPIO {} ({})", index, gpio_path.display());
        Ok(Self {
            index,
            label,
            value: Some(value),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    fn value_file(&mut self) -> Result<&mut File> {
        match self.value.as_mut() {
            Some(file) => Ok(file),
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

fn value_path(base_path: &Path, index: u32) -> PathBuf {
    base_path.join(format!("gpio{}", index)).join("value")
}

impl OutputLine for SysfsLine {
    fn label(&self) -> &str {
        &self.label
    }

    fn set(&mut self, status: bool) -> Result<()> {
        let raw: &[u8] = if status { b"1" } else { b"0" };
        let written = {
            let file = self.value_file()?;
            file.seek(SeekFrom::Start(0)).and_then(|_| file.write_all(raw))
        };
        written.map_err(|e| self.io_err(e))?;
        debug!("GPIO {} <- {}", self.index, status);
        Ok(())
    }

    fn get(&mut self) -> Result<bool> {
        let mut buf = [0u8; 1];
        let read = {
            let file = self.value_file()?;
            file.seek(SeekFrom::Start(0)).and_then(|_| file.read_exact(&mut buf))
        };
        read.map_err(|e| self.io_err(e))?;

        match buf[0] {
            b'0' => Ok(false),
            b'1' => Ok(true),
            other => Err(GpioError::OutOfRange {
                line: self.label.clone(),
                raw: (other as char).to_string(),
            }),
        }
    }

    fn release(&mut self) {
        if self.value.take().is_some() {
            debug!("Released GPIO {}", self.index);
        }
    }

    fn is_released(&self) -> bool {
        self.value.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::test_utils::FakeSysfsTree;

    #[test]
    fn test_request_existing_line_keeps_output_direction() {
        let tree = FakeSysfsTree::new().unwrap();
        tree.add_line(17, "out", "0").unwrap();

        let mut line = SysfsLine::request(tree.path(), 17).unwrap();
        line.set(true).unwrap();

        assert_eq!(tree.value(17).unwrap(), "1");
        assert_eq!(tree.direction(17).unwrap(), "out");
        assert!(tree.exported().unwrap().is_empty());
        assert!(line.get().unwrap());
    }

    #[test]
    fn test_request_switches_input_to_output() {
        let tree = FakeSysfsTree::new().unwrap();
        tree.add_line(4, "in", "1").unwrap();

        let mut line = SysfsLine::request(tree.path(), 4).unwrap();
        assert_eq!(tree.direction(4).unwrap(), "out");

        line.set(false).unwrap();
        assert!(!line.get().unwrap());
    }

    #[test]
    fn test_request_exports_missing_line() {
        let tree = FakeSysfsTree::new().unwrap();

        // The fake tree has no kernel behind it, so gpio9 never appears
        let result = SysfsLine::request(tree.path(), 9);
        assert!(matches!(result, Err(GpioError::Request { .. })));
        assert_eq!(tree.exported().unwrap(), "9");
    }

    #[test]
    fn test_get_out_of_range() {
        let tree = FakeSysfsTree::new().unwrap();
        tree.add_line(3, "out", "x").unwrap();

        let mut line = SysfsLine::request(tree.path(), 3).unwrap();
        let err = line.get().unwrap_err();
        assert!(matches!(err, GpioError::OutOfRange { .. }));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_release_is_idempotent() {
        let tree = FakeSysfsTree::new().unwrap();
        tree.add_line(5, "out", "0").unwrap();

        let mut line = SysfsLine::request(tree.path(), 5).unwrap();
        line.release();
        line.release();

        assert!(line.is_released());
        assert!(matches!(line.set(true), Err(GpioError::Released { .. })));
    }
}
