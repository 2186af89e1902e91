//! Dispatch configuration

use labwire_protocols::gpio::{DEFAULT_CONSUMER, DEFAULT_SYSFS_PREFIX};
use labwire_protocols::modbus::DEFAULT_UNIT_ID;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Port an agent listens on unless the host identifier names another one
pub const DEFAULT_AGENT_PORT: u16 = 7630;

/// Settings shared by the dispatch proxy, its backends and the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub agent_port: u16,
    pub agent_connect_timeout_ms: u64,
    pub agent_request_timeout_ms: u64,
    pub modbus_timeout_ms: u64,
    pub modbus_unit_id: u8,
    /// Agent drops a session that sends nothing for this long
    pub session_idle_timeout_ms: u64,
    pub sysfs_prefix: String,
    pub gpiochip_prefix: String,
    /// Consumer label for character-device line requests
    pub consumer_label: String,
    /// Host identifier -> `host[:port]` replacement applied before resolution
    pub host_overrides: HashMap<String, String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            agent_port: DEFAULT_AGENT_PORT,
            agent_connect_timeout_ms: 5_000,
            agent_request_timeout_ms: 10_000,
            modbus_timeout_ms: 5_000,
            modbus_unit_id: DEFAULT_UNIT_ID,
            session_idle_timeout_ms: 300_000,
            sysfs_prefix: DEFAULT_SYSFS_PREFIX.to_string(),
            gpiochip_prefix: "/dev".to_string(),
            consumer_label: DEFAULT_CONSUMER.to_string(),
            host_overrides: HashMap::new(),
        }
    }
}

impl DispatchConfig {
    pub fn agent_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_connect_timeout_ms)
    }

    pub fn agent_request_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_request_timeout_ms)
    }

    pub fn modbus_timeout(&self) -> Duration {
        Duration::from_millis(self.modbus_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.session_idle_timeout_ms)
    }
}
