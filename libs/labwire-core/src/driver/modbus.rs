//! Modbus-TCP coil driver
//!
//! One driver covers plain coils and boards that can only report the whole
//! coil bank; the difference is the injected [`CoilReadStrategy`]. Polarity
//! inversion is applied here, on both paths.

use super::{Binding, DigitalOutput};
use crate::dispatch::{DispatchProxy, DispatchTarget, Request};
use crate::error::{CoilAction, CoilProtocolError, DispatchError, Result};
use crate::resource::{CoilAddress, ResourceDescriptor, Technology};
use async_trait::async_trait;
use labwire_protocols::modbus::{ExceptionCode, TransportErrorCode};
use std::sync::Arc;
use tracing::{debug, info};

/// How the state of one coil is read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoilReadStrategy {
    /// Read exactly the addressed coil
    DirectRead,
    /// Read `coil_count` coils from 0 and pick the addressed one
    BatchIndexedRead { coil_count: u16 },
}

impl CoilReadStrategy {
    pub fn request(&self, coil: u16) -> Request {
        match self {
            CoilReadStrategy::DirectRead => Request::ReadCoils {
                start: coil,
                count: 1,
            },
            CoilReadStrategy::BatchIndexedRead { coil_count } => Request::ReadCoils {
                start: 0,
                count: *coil_count,
            },
        }
    }

    pub fn select(&self, coil: u16, coils: &[bool]) -> Option<bool> {
        match self {
            CoilReadStrategy::DirectRead => coils.first().copied(),
            CoilReadStrategy::BatchIndexedRead { .. } => coils.get(coil as usize).copied(),
        }
    }
}

/// Drives one Modbus-TCP coil
#[derive(Debug)]
pub struct ModbusCoilDriver {
    binding: Binding,
    address: CoilAddress,
    strategy: CoilReadStrategy,
}

impl ModbusCoilDriver {
    pub fn new(descriptor: Arc<ResourceDescriptor>, proxy: DispatchProxy) -> Result<Self> {
        let (driver, address, strategy) = match &descriptor.technology {
            Technology::ModbusCoil(address) => (
                "ModbusCoilDriver",
                address.clone(),
                CoilReadStrategy::DirectRead,
            ),
            Technology::WaveshareModbusCoil {
                address,
                coil_count,
            } => {
                if address.coil >= *coil_count {
                    return Err(DispatchError::configuration(format!(
                        "coil {} is out of range for a board with {} coils",
                        address.coil, coil_count
                    )));
                }
                (
                    "WaveshareModbusCoilDriver",
                    address.clone(),
                    CoilReadStrategy::BatchIndexedRead {
                        coil_count: *coil_count,
                    },
                )
            }
            other => {
                return Err(DispatchError::configuration(format!(
                    "Modbus coil driver cannot bind {} ({})",
                    descriptor.name,
                    other.tag()
                )))
            }
        };

        Ok(Self {
            binding: Binding::new(driver, descriptor, proxy)?,
            address,
            strategy,
        })
    }

    pub fn strategy(&self) -> CoilReadStrategy {
        self.strategy
    }

    pub fn target(&self) -> Option<&DispatchTarget> {
        self.binding.target()
    }
}

#[async_trait]
impl DigitalOutput for ModbusCoilDriver {
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

        let value = status != self.address.invert;
        let request = if self.address.write_multiple_coils {
            Request::WriteMultipleCoils {
                start: self.address.coil,
                values: vec![value],
            }
        } else {
            Request::WriteSingleCoil {
                coil: self.address.coil,
                value,
            }
        };

        self.binding.invoke(request).await?.into_done()
    }

    async fn get(&mut self) -> Result<bool> {
        let coils = self
            .binding
            .invoke(self.strategy.request(self.address.coil))
            .await?
            .into_coils()?;

        let raw = self.strategy.select(self.address.coil, &coils).ok_or_else(|| {
            DispatchError::from(CoilProtocolError::decode(
                CoilAction::Read,
                TransportErrorCode::Frame,
                ExceptionCode::None,
            ))
        })?;
        debug!(
            "coil {} raw={} from {} coils",
            self.address.coil,
            raw,
            coils.len()
        );

        let status = raw != self.address.invert;
        info!(
            driver = self.binding.driver(),
            resource = %self.binding.name(),
            result = status,
            "get"
        );
        Ok(status)
    }
}
