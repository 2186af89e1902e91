//! Host/port resolution boundary
//!
//! Drivers never decide how a host identifier maps to a network endpoint;
//! they ask a [`HostPortResolver`] with the default port of the service they
//! want to reach.

use crate::error::{DispatchError, Result};
use std::collections::HashMap;

/// `(host identifier, default port) -> (host, port)`
pub trait HostPortResolver: Send + Sync {
    fn resolve(&self, host: &str, default_port: u16) -> Result<(String, u16)>;
}

/// Resolver for `name`, `name:port`, `[v6addr]` and `[v6addr]:port`, with an
/// optional replacement table consulted first.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    overrides: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn insert(&mut self, host: impl Into<String>, target: impl Into<String>) {
        self.overrides.insert(host.into(), target.into());
    }
}

impl HostPortResolver for StaticResolver {
    fn resolve(&self, host: &str, default_port: u16) -> Result<(String, u16)> {
        let host = host.trim();
        let target = self.overrides.get(host).map(String::as_str).unwrap_or(host);
        split_host_port(target, default_port)
    }
}

fn split_host_port(target: &str, default_port: u16) -> Result<(String, u16)> {
    if target.is_empty() {
        return Err(DispatchError::configuration("empty host identifier"));
    }

    // [v6]:port
    if let Some(rest) = target.strip_prefix('[') {
        let (addr, tail) = rest.split_once(']').ok_or_else(|| {
            DispatchError::configuration(format!("unterminated IPv6 literal in {:?}", target))
        })?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(target, port)?,
            None if tail.is_empty() => default_port,
            None => {
                return Err(DispatchError::configuration(format!(
                    "unexpected text after IPv6 literal in {:?}",
                    target
                )))
            }
        };
        return Ok((addr.to_string(), port));
    }

    match target.rsplit_once(':') {
        // A bare IPv6 address has several colons and no port
        Some((host, _)) if host.contains(':') => Ok((target.to_string(), default_port)),
        Some((host, port)) => Ok((host.to_string(), parse_port(target, port)?)),
        None => Ok((target.to_string(), default_port)),
    }
}

fn parse_port(target: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(DispatchError::configuration(format!(
            "invalid port {:?} in {:?}",
            port, target
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let resolver = StaticResolver::new();
        assert_eq!(
            resolver.resolve("relay-board", 502).unwrap(),
            ("relay-board".to_string(), 502)
        );
    }

    #[test]
    fn test_explicit_port() {
        let resolver = StaticResolver::new();
        assert_eq!(
            resolver.resolve("10.0.0.5:1502", 502).unwrap(),
            ("10.0.0.5".to_string(), 1502)
        );
    }

    #[test]
    fn test_ipv6() {
        let resolver = StaticResolver::new();
        assert_eq!(
            resolver.resolve("[::1]:7000", 502).unwrap(),
            ("::1".to_string(), 7000)
        );
        assert_eq!(resolver.resolve("[fe80::1]", 502).unwrap().1, 502);
        assert_eq!(
            resolver.resolve("fe80::1", 502).unwrap(),
            ("fe80::1".to_string(), 502)
        );
    }

    #[test]
    fn test_invalid_port() {
        let resolver = StaticResolver::new();
        assert!(resolver.resolve("relay:http", 502).is_err());
        assert!(resolver.resolve("relay:0", 502).is_err());
        assert!(resolver.resolve("relay:70000", 502).is_err());
        assert!(resolver.resolve("", 502).is_err());
    }

    #[test]
    fn test_override_applies_before_parsing() {
        let mut resolver = StaticResolver::new();
        resolver.insert("exporter-1", "127.0.0.1:17630");

        assert_eq!(
            resolver.resolve("exporter-1", 7630).unwrap(),
            ("127.0.0.1".to_string(), 17630)
        );
        assert_eq!(resolver.resolve("exporter-2", 7630).unwrap().1, 7630);
    }
}
