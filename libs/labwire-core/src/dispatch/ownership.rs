//! Line ownership table
//!
//! One entry per attached line. Entries live exactly as long as the
//! [`Claim`] returned by [`OwnershipTable::claim`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Physical line identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LineAddress {
    Sysfs { index: u32 },
    Gpiod { gpiochip: u32, line_offset: u32 },
    /// `endpoint` is the resolved `host:port` locally, the raw host identifier remotely
    Coil { endpoint: String, coil: u16 },
}

impl fmt::Display for LineAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineAddress::Sysfs { index } => write!(f, "sysfs gpio{}", index),
            LineAddress::Gpiod {
                gpiochip,
                line_offset,
            } => write!(f, "gpiochip{} line {}", gpiochip, line_offset),
            LineAddress::Coil { endpoint, coil } => write!(f, "coil {} @ {}", coil, endpoint),
        }
    }
}

/// Line identity qualified by the agent holding it (`None` = this process)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub agent: Option<String>,
    pub line: LineAddress,
}

impl LineKey {
    pub fn local(line: LineAddress) -> Self {
        Self { agent: None, line }
    }

    pub fn remote(agent: impl Into<String>, line: LineAddress) -> Self {
        Self {
            agent: Some(agent.into()),
            line,
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.agent {
            Some(agent) => write!(f, "{} on {}", self.line, agent),
            None => write!(f, "{}", self.line),
        }
    }
}

/// `LineKey -> activation id`, scoped to one dispatch proxy
#[derive(Debug, Default)]
pub struct OwnershipTable {
    claims: Mutex<HashMap<LineKey, u64>>,
    next_activation: AtomicU64,
}

impl OwnershipTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record `key` as held. Returns the current holder's activation id if
    /// the line is already claimed.
    pub fn claim(self: &Arc<Self>, key: LineKey) -> Result<Claim, u64> {
        let mut claims = self.claims.lock();
        if let Some(holder) = claims.get(&key) {
            return Err(*holder);
        }

        let activation = self.next_activation.fetch_add(1, Ordering::Relaxed) + 1;
        claims.insert(key.clone(), activation);
        debug!("Claimed {} for activation {}", key, activation);

        Ok(Claim {
            table: Arc::clone(self),
            key,
            activation,
        })
    }

    pub fn is_claimed(&self, key: &LineKey) -> bool {
        self.claims.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.claims.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &LineKey, activation: u64) {
        let mut claims = self.claims.lock();
        if claims.get(key) == Some(&activation) {
            claims.remove(key);
            debug!("Released {} from activation {}", key, activation);
        }
    }
}

/// Held entry in an [`OwnershipTable`]; removed on drop.
#[derive(Debug)]
pub struct Claim {
    table: Arc<OwnershipTable>,
    key: LineKey,
    activation: u64,
}

impl Claim {
    pub fn key(&self) -> &LineKey {
        &self.key
    }

    pub fn activation(&self) -> u64 {
        self.activation
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.table.remove(&self.key, self.activation);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_fails_until_release() {
        let table = OwnershipTable::new();
        let key = LineKey::local(LineAddress::Sysfs { index: 4 });

        let first = table.claim(key.clone()).unwrap();
        assert_eq!(table.claim(key.clone()).unwrap_err(), first.activation());

        drop(first);
        assert!(!table.is_claimed(&key));
        let second = table.claim(key.clone()).unwrap();
        assert!(second.activation() > 1);
    }

    #[test]
    fn test_keys_are_qualified_by_agent() {
        let table = OwnershipTable::new();
        let line = LineAddress::Gpiod {
            gpiochip: 0,
            line_offset: 3,
        };

        let _local = table.claim(LineKey::local(line.clone())).unwrap();
        let _remote = table
            .claim(LineKey::remote("exporter-1:7630", line.clone()))
            .unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.claim(LineKey::remote("exporter-1:7630", line)).is_err());
    }
}
