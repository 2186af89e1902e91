//! Drivers: boolean outputs bound to one resource
//!
//! Every driver follows the same lifecycle:
//!
//! ```text
//!   Inactive ──activate()──▶ Active ──deactivate()──▶ Inactive
//!      │                       │
//!      └─ set/get: Lifecycle   └─ set/get forwarded through the BackendHandle
//! ```
//!
//! `activate` on an active driver is rejected; `deactivate` on an inactive
//! driver does nothing.

mod gpio;
mod modbus;

pub use gpio::GpioDriver;
pub use modbus::{CoilReadStrategy, ModbusCoilDriver};

use crate::dispatch::{BackendHandle, DispatchProxy, DispatchTarget, Reply, Request};
use crate::error::{DispatchError, Result};
use crate::resource::ResourceDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// A boolean output, whatever drives it and wherever it runs
#[async_trait]
pub trait DigitalOutput: Send {
    fn descriptor(&self) -> &ResourceDescriptor;

    fn is_active(&self) -> bool;

    /// Resolve the target and attach the backend
    async fn activate(&mut self) -> Result<()>;

    /// Release the backend; no-op when inactive
    async fn deactivate(&mut self) -> Result<()>;

    async fn set(&mut self, status: bool) -> Result<()>;

    async fn get(&mut self) -> Result<bool>;
}

/// Bind the driver matching the descriptor's technology
pub fn bind_driver(
    descriptor: Arc<ResourceDescriptor>,
    proxy: DispatchProxy,
) -> Result<Box<dyn DigitalOutput>> {
    if descriptor.technology.is_gpio() {
        Ok(Box::new(GpioDriver::new(descriptor, proxy)?))
    } else {
        Ok(Box::new(ModbusCoilDriver::new(descriptor, proxy)?))
    }
}

/// Descriptor, proxy and the handle of the current activation
#[derive(Debug)]
pub(crate) struct Binding {
    driver: &'static str,
    descriptor: Arc<ResourceDescriptor>,
    proxy: DispatchProxy,
    handle: Option<BackendHandle>,
}

impl Binding {
    pub(crate) fn new(
        driver: &'static str,
        descriptor: Arc<ResourceDescriptor>,
        proxy: DispatchProxy,
    ) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self {
            driver,
            descriptor,
            proxy,
            handle: None,
        })
    }

    pub(crate) fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub(crate) fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub(crate) fn driver(&self) -> &'static str {
        self.driver
    }

    pub(crate) fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn target(&self) -> Option<&DispatchTarget> {
        self.handle.as_ref().map(BackendHandle::target)
    }

    pub(crate) async fn activate(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(DispatchError::lifecycle(format!(
                "{} for {} is already active",
                self.driver, self.descriptor.name
            )));
        }

        let handle = self.proxy.attach(&self.descriptor).await?;
        info!(
            driver = self.driver,
            resource = %self.descriptor.name,
            target = %handle.target(),
            "activated"
        );
        self.handle = Some(handle);
        Ok(())
    }

    pub(crate) async fn deactivate(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release().await;
            info!(
                driver = self.driver,
                resource = %self.descriptor.name,
                "deactivated"
            );
        }
    }

    pub(crate) async fn invoke(&mut self, request: Request) -> Result<Reply> {
        match self.handle.as_mut() {
            Some(handle) => handle.invoke(request).await,
            None => Err(DispatchError::lifecycle(format!(
                "{} for {} is not active",
                self.driver, self.descriptor.name
            ))),
        }
    }
}
