//! Resource descriptors
//!
//! A descriptor names one physical output: its technology, the address the
//! backend needs, and optionally the agent host it is attached to. Descriptors
//! are validated when built and never change afterwards.

use crate::error::{DispatchError, Result};
use labwire_protocols::modbus::constants::MAX_READ_COILS;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_coil_count() -> u16 {
    8
}

/// Address of a Modbus-TCP coil
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoilAddress {
    /// Modbus device, `name` or `name:port`
    pub host: String,
    pub coil: u16,
    /// Swap logical and electrical state
    #[serde(default)]
    pub invert: bool,
    /// Write with FC15 instead of FC05
    #[serde(default)]
    pub write_multiple_coils: bool,
}

/// Technology tag plus the address fields it requires
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "technology", rename_all = "snake_case")]
pub enum Technology {
    /// `/sys/class/gpio/gpio{index}`
    SysfsGpio { index: u32 },
    /// Line `line_offset` of `/dev/gpiochip{gpiochip}`
    GpiodGpio { gpiochip: u32, line_offset: u32 },
    ModbusCoil(CoilAddress),
    /// Relay boards that only answer full-bank coil reads
    WaveshareModbusCoil {
        #[serde(flatten)]
        address: CoilAddress,
        #[serde(default = "default_coil_count")]
        coil_count: u16,
    },
}

impl Technology {
    pub fn tag(&self) -> &'static str {
        match self {
            Technology::SysfsGpio { .. } => "sysfs_gpio",
            Technology::GpiodGpio { .. } => "gpiod_gpio",
            Technology::ModbusCoil(_) => "modbus_coil",
            Technology::WaveshareModbusCoil { .. } => "waveshare_modbus_coil",
        }
    }

    pub fn is_gpio(&self) -> bool {
        matches!(
            self,
            Technology::SysfsGpio { .. } | Technology::GpiodGpio { .. }
        )
    }

    pub fn coil_address(&self) -> Option<&CoilAddress> {
        match self {
            Technology::ModbusCoil(address)
            | Technology::WaveshareModbusCoil { address, .. } => Some(address),
            _ => None,
        }
    }

    /// Check the address fields required by the tag
    pub fn validate(&self) -> Result<()> {
        if let Some(address) = self.coil_address() {
            if address.host.trim().is_empty() {
                return Err(DispatchError::configuration(format!(
                    "{} requires a Modbus host",
                    self.tag()
                )));
            }
        }

        if let Technology::WaveshareModbusCoil {
            address,
            coil_count,
        } = self
        {
            if *coil_count == 0 || *coil_count > MAX_READ_COILS {
                return Err(DispatchError::configuration(format!(
                    "waveshare_modbus_coil coil_count {} outside 1..={}",
                    coil_count, MAX_READ_COILS
                )));
            }
            if address.coil >= *coil_count {
                return Err(DispatchError::configuration(format!(
                    "coil {} is out of range for a board with {} coils",
                    address.coil, coil_count
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Technology::SysfsGpio { index } => write!(f, "sysfs gpio{}", index),
            Technology::GpiodGpio {
                gpiochip,
                line_offset,
            } => write!(f, "gpiochip{} line {}", gpiochip, line_offset),
            Technology::ModbusCoil(address) => {
                write!(f, "modbus coil {} @ {}", address.coil, address.host)
            }
            Technology::WaveshareModbusCoil {
                address,
                coil_count,
            } => write!(
                f,
                "waveshare coil {}/{} @ {}",
                address.coil, coil_count, address.host
            ),
        }
    }
}

/// Immutable description of one addressable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Name used in logs
    pub name: String,
    /// Agent host the output is attached to; `None` means this process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(flatten)]
    pub technology: Technology,
}

impl ResourceDescriptor {
    /// Build and validate a descriptor
    pub fn new(
        name: impl Into<String>,
        agent: Option<String>,
        technology: Technology,
    ) -> Result<Self> {
        let descriptor = Self {
            name: name.into(),
            agent,
            technology,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn local(name: impl Into<String>, technology: Technology) -> Result<Self> {
        Self::new(name, None, technology)
    }

    pub fn remote(
        name: impl Into<String>,
        agent: impl Into<String>,
        technology: Technology,
    ) -> Result<Self> {
        Self::new(name, Some(agent.into()), technology)
    }

    /// Validation applied to descriptors produced by deserialization
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::configuration("resource name is empty"));
        }
        if let Some(agent) = &self.agent {
            if agent.trim().is_empty() {
                return Err(DispatchError::configuration(format!(
                    "resource {} has an empty agent host",
                    self.name
                )));
            }
        }
        self.technology.validate()
    }

    pub fn is_remote(&self) -> bool {
        self.agent.is_some()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.agent {
            Some(agent) => write!(f, "{} ({} via {})", self.name, self.technology, agent),
            None => write!(f, "{} ({})", self.name, self.technology),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn coil(host: &str, coil: u16) -> CoilAddress {
        CoilAddress {
            host: host.to_string(),
            coil,
            invert: false,
            write_multiple_coils: false,
        }
    }

    #[test]
    fn test_waveshare_coil_must_be_below_count() {
        let ok = ResourceDescriptor::local(
            "relay",
            Technology::WaveshareModbusCoil {
                address: coil("relay-board", 3),
                coil_count: 4,
            },
        );
        assert!(ok.is_ok());

        let err = ResourceDescriptor::local(
            "relay",
            Technology::WaveshareModbusCoil {
                address: coil("relay-board", 4),
                coil_count: 4,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration { .. }));
    }

    #[test]
    fn test_empty_modbus_host_rejected() {
        let err =
            ResourceDescriptor::local("relay", Technology::ModbusCoil(coil(" ", 0))).unwrap_err();
        assert!(err.to_string().contains("Modbus host"));
    }

    #[test]
    fn test_empty_agent_host_rejected() {
        let err = ResourceDescriptor::remote("led", "", Technology::SysfsGpio { index: 3 });
        assert!(err.is_err());
    }

    #[test]
    fn test_deserialize_descriptors() {
        let yaml = r#"
- name: power
  technology: modbus_coil
  host: relay-board:1502
  coil: 2
  invert: true
- name: reset
  agent: exporter-1
  technology: gpiod_gpio
  gpiochip: 0
  line_offset: 17
- name: bank
  technology: waveshare_modbus_coil
  host: waveshare
  coil: 5
"#;
        let descriptors: Vec<ResourceDescriptor> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptors.len(), 3);

        match &descriptors[0].technology {
            Technology::ModbusCoil(address) => {
                assert_eq!(address.host, "relay-board:1502");
                assert!(address.invert);
                assert!(!address.write_multiple_coils);
            }
            other => panic!("unexpected technology {:?}", other),
        }

        assert!(!descriptors[0].is_remote());
        assert_eq!(descriptors[1].agent.as_deref(), Some("exporter-1"));
        assert_eq!(
            descriptors[1].technology,
            Technology::GpiodGpio {
                gpiochip: 0,
                line_offset: 17
            }
        );

        match &descriptors[2].technology {
            Technology::WaveshareModbusCoil { coil_count, .. } => assert_eq!(*coil_count, 8),
            other => panic!("unexpected technology {:?}", other),
        }

        for descriptor in &descriptors {
            descriptor.validate().unwrap();
        }
    }
}
