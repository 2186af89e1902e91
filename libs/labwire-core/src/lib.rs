//! labwire core
//!
//! Uniform boolean outputs over GPIO lines and Modbus-TCP coils, executed in
//! this process or on a remote `labagent`:
//!
//! ```text
//! labwire-core
//!     ├── resource   (ResourceDescriptor, Technology)
//!     ├── resolver   (HostPortResolver boundary)
//!     ├── dispatch   (DispatchProxy, BackendHandle, ownership table, agent wire protocol)
//!     ├── driver     (DigitalOutput: GpioDriver, ModbusCoilDriver)
//!     └── agent      (session server used by labagent)
//! ```
//!
//! ```ignore
//! let proxy = DispatchProxy::new(DispatchConfig::default());
//! let descriptor = Arc::new(ResourceDescriptor::remote(
//!     "dut-power",
//!     "exporter-1",
//!     Technology::GpiodGpio { gpiochip: 0, line_offset: 17 },
//! )?);
//! let mut output = bind_driver(descriptor, proxy)?;
//! output.activate().await?;
//! output.set(true).await?;
//! output.deactivate().await?;
//! ```

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod resolver;
pub mod resource;

pub use config::DispatchConfig;
pub use dispatch::{DispatchProxy, DispatchTarget};
pub use driver::{bind_driver, DigitalOutput, GpioDriver, ModbusCoilDriver};
pub use error::{DispatchError, Result};
pub use resource::{CoilAddress, ResourceDescriptor, Technology};

/// Common imports for driver users
pub mod prelude {
    pub use crate::config::DispatchConfig;
    pub use crate::dispatch::DispatchProxy;
    pub use crate::driver::{bind_driver, CoilReadStrategy, DigitalOutput};
    pub use crate::error::{CoilProtocolError, DispatchError, Result};
    pub use crate::resource::{CoilAddress, ResourceDescriptor, Technology};
}
