//! labwire Common Library
//!
//! Shared plumbing used by every labwire crate: the common error type,
//! layered configuration loading and tracing initialization.

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use error::{Error, Result};
pub use logging::init_logging;

/// Common prelude for labwire crates
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::logging::{init_logging, LogConfig, LogFormat};
    pub use tracing::{debug, error, info, trace, warn};
}
