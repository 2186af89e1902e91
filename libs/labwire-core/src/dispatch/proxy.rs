//! Dispatch proxy and backend handles

use super::local::{GpioLineProvider, LocalBackend, SystemGpio};
use super::ownership::{Claim, LineAddress, LineKey, OwnershipTable};
use super::remote::AgentConnection;
use super::wire::{Reply, Request};
use super::DispatchTarget;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::resolver::{HostPortResolver, StaticResolver};
use crate::resource::{ResourceDescriptor, Technology};
use labwire_protocols::modbus::{ModbusTcpClient, DEFAULT_PORT};
use std::sync::Arc;
use tracing::{debug, info};

/// Attaches backends for drivers, in this process or on an agent.
///
/// Clones share configuration, resolver, GPIO provider and ownership table.
#[derive(Clone)]
pub struct DispatchProxy {
    config: Arc<DispatchConfig>,
    resolver: Arc<dyn HostPortResolver>,
    gpio: Arc<dyn GpioLineProvider>,
    ownership: Arc<OwnershipTable>,
}

impl DispatchProxy {
    pub fn new(config: DispatchConfig) -> Self {
        let resolver = StaticResolver::with_overrides(config.host_overrides.clone());
        let gpio = SystemGpio::from_config(&config);
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            gpio: Arc::new(gpio),
            ownership: OwnershipTable::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostPortResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_gpio_provider(mut self, gpio: Arc<dyn GpioLineProvider>) -> Self {
        self.gpio = gpio;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    /// Local unless the descriptor names an agent host
    pub fn target_for(&self, descriptor: &ResourceDescriptor) -> Result<DispatchTarget> {
        match &descriptor.agent {
            None => Ok(DispatchTarget::Local),
            Some(agent) => {
                let (host, port) = self.resolver.resolve(agent, self.config.agent_port)?;
                Ok(DispatchTarget::Remote { host, port })
            }
        }
    }

    /// Resolve the target once and attach the backend for `descriptor`.
    pub async fn attach(&self, descriptor: &ResourceDescriptor) -> Result<BackendHandle> {
        descriptor.validate()?;
        match self.target_for(descriptor)? {
            DispatchTarget::Local => self.attach_local(&descriptor.technology).await,
            DispatchTarget::Remote { host, port } => {
                self.attach_remote(&host, port, &descriptor.technology).await
            }
        }
    }

    /// Attach a backend in this process.
    pub async fn attach_local(&self, technology: &Technology) -> Result<BackendHandle> {
        let key = LineKey::local(self.local_line_address(technology)?);
        let claim = self.claim(key, technology)?;

        let backend = match technology {
            Technology::SysfsGpio { index } => LocalBackend::Gpio(self.gpio.sysfs(*index)?),
            Technology::GpiodGpio {
                gpiochip,
                line_offset,
            } => LocalBackend::Gpio(self.gpio.gpiod(*gpiochip, *line_offset)?),
            Technology::ModbusCoil(address) | Technology::WaveshareModbusCoil { address, .. } => {
                let (host, port) = self.resolver.resolve(&address.host, DEFAULT_PORT)?;
                let client = ModbusTcpClient::new(host, port)
                    .with_unit_id(self.config.modbus_unit_id)
                    .with_timeout(self.config.modbus_timeout());
                LocalBackend::Coil(client)
            }
        };

        debug!("Attached local backend for {}", technology);
        Ok(BackendHandle {
            target: DispatchTarget::Local,
            backend: Backend::Local(backend),
            claim,
        })
    }

    async fn attach_remote(
        &self,
        host: &str,
        port: u16,
        technology: &Technology,
    ) -> Result<BackendHandle> {
        let agent = format!("{}:{}", host, port);
        let key = LineKey::remote(agent, remote_line_address(technology));
        let claim = self.claim(key, technology)?;

        let connection = AgentConnection::connect(
            host,
            port,
            technology,
            self.config.agent_connect_timeout(),
            self.config.agent_request_timeout(),
        )
        .await?;

        Ok(BackendHandle {
            target: DispatchTarget::Remote {
                host: host.to_string(),
                port,
            },
            backend: Backend::Remote(connection),
            claim,
        })
    }

    fn local_line_address(&self, technology: &Technology) -> Result<LineAddress> {
        match technology.coil_address() {
            Some(address) => {
                let (host, port) = self.resolver.resolve(&address.host, DEFAULT_PORT)?;
                Ok(LineAddress::Coil {
                    endpoint: format!("{}:{}", host, port),
                    coil: address.coil,
                })
            }
            None => Ok(remote_line_address(technology)),
        }
    }

    fn claim(&self, key: LineKey, technology: &Technology) -> Result<Claim> {
        self.ownership.claim(key.clone()).map_err(|holder| {
            let message = format!("{} is already held by activation {}", key, holder);
            if technology.is_gpio() {
                DispatchError::device(message)
            } else {
                DispatchError::connection(message)
            }
        })
    }
}

/// Line identity without resolving anything; agents resolve on their side.
fn remote_line_address(technology: &Technology) -> LineAddress {
    match technology {
        Technology::SysfsGpio { index } => LineAddress::Sysfs { index: *index },
        Technology::GpiodGpio {
            gpiochip,
            line_offset,
        } => LineAddress::Gpiod {
            gpiochip: *gpiochip,
            line_offset: *line_offset,
        },
        Technology::ModbusCoil(address) | Technology::WaveshareModbusCoil { address, .. } => {
            LineAddress::Coil {
                endpoint: address.host.clone(),
                coil: address.coil,
            }
        }
    }
}

impl std::fmt::Debug for DispatchProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchProxy")
            .field("config", &self.config)
            .field("claimed_lines", &self.ownership.len())
            .finish()
    }
}

#[derive(Debug)]
enum Backend {
    Local(LocalBackend),
    Remote(AgentConnection),
}

/// Live backend of one activation. Holds the line's ownership claim.
#[derive(Debug)]
pub struct BackendHandle {
    target: DispatchTarget,
    backend: Backend,
    claim: Claim,
}

impl BackendHandle {
    pub fn target(&self) -> &DispatchTarget {
        &self.target
    }

    pub fn key(&self) -> &LineKey {
        self.claim.key()
    }

    /// Forward one call; results and failures come back unchanged.
    pub async fn invoke(&mut self, request: Request) -> Result<Reply> {
        match &mut self.backend {
            Backend::Local(backend) => backend.invoke(request).await,
            Backend::Remote(connection) => connection.invoke(request).await,
        }
    }

    /// Release the line (or close the agent session) and drop the claim.
    pub async fn release(self) {
        let BackendHandle {
            target,
            backend,
            claim,
        } = self;

        match backend {
            Backend::Local(mut backend) => backend.release(),
            Backend::Remote(connection) => connection.close().await,
        }
        info!("Released {} ({})", claim.key(), target);
        drop(claim);
    }
}
