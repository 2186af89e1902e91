//! In-process backends

use super::wire::{Reply, Request};
use crate::config::DispatchConfig;
use crate::error::{CoilAction, CoilProtocolError, DispatchError, Result};
use labwire_protocols::gpio::{CdevLine, GpioError, OutputLine, SysfsLine};
use labwire_protocols::modbus::ModbusTcpClient;
use std::path::PathBuf;
use tracing::debug;

/// Opens GPIO lines for local backends
pub trait GpioLineProvider: Send + Sync {
    fn sysfs(&self, index: u32) -> std::result::Result<Box<dyn OutputLine>, GpioError>;

    fn gpiod(
        &self,
        gpiochip: u32,
        line_offset: u32,
    ) -> std::result::Result<Box<dyn OutputLine>, GpioError>;
}

/// Lines of the running kernel, below the configured prefixes
#[derive(Debug, Clone)]
pub struct SystemGpio {
    sysfs_prefix: PathBuf,
    gpiochip_prefix: PathBuf,
    consumer: String,
}

impl SystemGpio {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            sysfs_prefix: PathBuf::from(&config.sysfs_prefix),
            gpiochip_prefix: PathBuf::from(&config.gpiochip_prefix),
            consumer: config.consumer_label.clone(),
        }
    }
}

impl GpioLineProvider for SystemGpio {
    fn sysfs(&self, index: u32) -> std::result::Result<Box<dyn OutputLine>, GpioError> {
        Ok(Box::new(SysfsLine::request(&self.sysfs_prefix, index)?))
    }

    fn gpiod(
        &self,
        gpiochip: u32,
        line_offset: u32,
    ) -> std::result::Result<Box<dyn OutputLine>, GpioError> {
        Ok(Box::new(CdevLine::request(
            &self.gpiochip_prefix,
            gpiochip,
            line_offset,
            &self.consumer,
        )?))
    }
}

/// Backend attached in this process
pub enum LocalBackend {
    Gpio(Box<dyn OutputLine>),
    Coil(ModbusTcpClient),
}

impl LocalBackend {
    fn kind(&self) -> &'static str {
        match self {
            LocalBackend::Gpio(_) => "GPIO backend",
            LocalBackend::Coil(_) => "Modbus coil backend",
        }
    }

    pub async fn invoke(&mut self, request: Request) -> Result<Reply> {
        debug!("{} <- {:?}", self.kind(), request);
        match (self, request) {
            (LocalBackend::Gpio(line), Request::Set { status }) => {
                line.set(status)?;
                Ok(Reply::Done)
            }
            (LocalBackend::Gpio(line), Request::Get) => Ok(Reply::Level(line.get()?)),
            (LocalBackend::Coil(client), Request::ReadCoils { start, count }) => {
                match client.read_coils(start, count).await {
                    Ok(coils) => Ok(Reply::Coils(coils)),
                    Err(_) => Err(coil_failure(client, CoilAction::Read)),
                }
            }
            (LocalBackend::Coil(client), Request::WriteSingleCoil { coil, value }) => {
                match client.write_single_coil(coil, value).await {
                    Ok(()) => Ok(Reply::Done),
                    Err(_) => Err(coil_failure(client, CoilAction::Write)),
                }
            }
            (LocalBackend::Coil(client), Request::WriteMultipleCoils { start, values }) => {
                match client.write_multiple_coils(start, &values).await {
                    Ok(()) => Ok(Reply::Done),
                    Err(_) => Err(coil_failure(client, CoilAction::Write)),
                }
            }
            (backend, request) => Err(DispatchError::configuration(format!(
                "{} does not support {}",
                backend.kind(),
                request.method()
            ))),
        }
    }

    /// Give the line back; coil clients hold no connection between requests.
    pub fn release(&mut self) {
        if let LocalBackend::Gpio(line) = self {
            line.release();
        }
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalBackend::Gpio(line) => f.debug_tuple("Gpio").field(&line.label()).finish(),
            LocalBackend::Coil(client) => f.debug_tuple("Coil").field(client).finish(),
        }
    }
}

/// Decode from the client's record of its last request
fn coil_failure(client: &ModbusTcpClient, action: CoilAction) -> DispatchError {
    CoilProtocolError::decode(action, client.last_error(), client.last_exception()).into()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use labwire_protocols::gpio::CdevLine;
    use labwire_protocols::test_utils::FakeLineHandle;

    #[tokio::test]
    async fn test_gpio_backend_rejects_coil_requests() {
        let line = CdevLine::from_handle("gpiochip0 line 1", Box::new(FakeLineHandle::new()));
        let mut backend = LocalBackend::Gpio(Box::new(line));

        let err = backend
            .invoke(Request::ReadCoils { start: 0, count: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration { .. }));

        backend.invoke(Request::Set { status: true }).await.unwrap();
        assert_eq!(
            backend.invoke(Request::Get).await.unwrap(),
            Reply::Level(true)
        );
    }
}
