//! Errors of the shared plumbing (configuration files, logging setup)

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Sources could not be merged or did not match the target type
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// Extension other than toml, yaml/yml or json
    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    /// Filter directive or subscriber installation failed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn logging(msg: impl Into<String>) -> Self {
        Error::Logging(msg.into())
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = Error::config("missing listen address");
        assert_eq!(err.to_string(), "Configuration error: missing listen address");

        let err = Error::MissingFile(PathBuf::from("/etc/labwire/labagent.yaml"));
        assert_eq!(
            err.to_string(),
            "Config file not found: /etc/labwire/labagent.yaml"
        );
    }

    #[test]
    fn test_figment_error_is_config_error() {
        let err: Error = figment::Error::from("bad value".to_string()).into();
        assert!(matches!(err, Error::Config(_)));
    }
}
