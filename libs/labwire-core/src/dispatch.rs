//! Location-transparent dispatch
//!
//! A driver never talks to hardware directly. It asks the [`DispatchProxy`]
//! for a [`BackendHandle`] at activation and sends every call through it:
//!
//! ```text
//!                     ┌──────────────────────────┐
//!  Driver ──invoke──▶ │ BackendHandle            │
//!                     │  ├─ Local  ─▶ LocalBackend ─▶ SysfsLine / CdevLine / ModbusTcpClient
//!                     │  └─ Remote ─▶ AgentConnection ══TCP══▶ labagent ─▶ LocalBackend
//!                     └──────────────────────────┘
//! ```
//!
//! The target is decided once per activation from the descriptor's agent
//! host. Every attached line is recorded in the proxy's [`OwnershipTable`]
//! until its handle is released, so a second activation of the same line
//! fails immediately instead of fighting over the hardware.

mod local;
mod ownership;
mod proxy;
mod remote;
pub mod wire;

pub use local::{GpioLineProvider, LocalBackend, SystemGpio};
pub use ownership::{Claim, LineAddress, LineKey, OwnershipTable};
pub use proxy::{BackendHandle, DispatchProxy};
pub use remote::AgentConnection;
pub use wire::{Reply, Request};

use std::fmt;

/// Where a backend runs for the current activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    Local,
    Remote { host: String, port: u16 },
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Local => f.write_str("local"),
            DispatchTarget::Remote { host, port } => write!(f, "agent {}:{}", host, port),
        }
    }
}
