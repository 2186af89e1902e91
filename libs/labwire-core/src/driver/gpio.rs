//! GPIO drivers (sysfs and character-device lines)

use super::{Binding, DigitalOutput};
use crate::dispatch::{DispatchProxy, DispatchTarget, Request};
use crate::error::{DispatchError, Result};
use crate::resource::{ResourceDescriptor, Technology};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Drives one GPIO line, sysfs or character device
#[derive(Debug)]
pub struct GpioDriver {
    binding: Binding,
}

impl GpioDriver {
    pub fn new(descriptor: Arc<ResourceDescriptor>, proxy: DispatchProxy) -> Result<Self> {
        let driver = match descriptor.technology {
            Technology::SysfsGpio { .. } => "SysfsGpioDriver",
            Technology::GpiodGpio { .. } => "GpiodGpioDriver",
            _ => {
                return Err(DispatchError::configuration(format!(
                    "GPIO driver cannot bind {} ({})",
                    descriptor.name,
                    descriptor.technology.tag()
                )))
            }
        };
        Ok(Self {
            binding: Binding::new(driver, descriptor, proxy)?,
        })
    }

    pub fn target(&self) -> Option<&DispatchTarget> {
        self.binding.target()
    }
}

#[async_trait]
impl DigitalOutput for GpioDriver {
    fn descriptor(&self) -> &ResourceDescriptor {
        self.binding.descriptor()
    }

    fn is_active(&self) -> bool {
        self.binding.is_active()
    }

    async fn activate(&mut self) -> Result<()> {
        self.binding.activate().await
    }

    async fn deactivate(&mut self) -> Result<()> {
        self.binding.deactivate().await;
        Ok(())
    }

    async fn set(&mut self, status: bool) -> Result<()> {
        info!(
            driver = self.binding.driver(),
            resource = %self.binding.name(),
            status,
            "set"
        );
        self.binding
            .invoke(Request::Set { status })
            .await?
            .into_done()
    }

    async fn get(&mut self) -> Result<bool> {
        let status = self.binding.invoke(Request::Get).await?.into_level()?;
        info!(
            driver = self.binding.driver(),
            resource = %self.binding.name(),
            result = status,
            "get"
        );
        Ok(status)
    }
}
