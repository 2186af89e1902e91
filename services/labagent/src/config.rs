//! labagent settings and command line

use clap::Parser;
use labwire_common::logging::LogConfig;
use labwire_core::config::{DispatchConfig, DEFAULT_AGENT_PORT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command-line arguments
#[derive(Debug, Clone, Parser)]
#[clap(author, version, about)]
pub struct Args {
    /// Configuration file (yaml, toml or json); defaults to config/labagent.*
    #[clap(short = 'c', long, env = "LABAGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address override (e.g. 0.0.0.0:7630)
    #[clap(short = 'b', long, env = "LABAGENT_LISTEN")]
    pub listen: Option<String>,

    /// Log level or filter directive; overrides the configured level
    #[clap(short = 'l', long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Disable colored output (useful for log files)
    #[clap(long)]
    pub no_color: bool,

    /// Only validate configuration without starting the agent
    #[clap(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address the session listener binds to
    pub listen: String,
    pub logging: LogConfig,
    pub dispatch: DispatchConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{}", DEFAULT_AGENT_PORT),
            logging: LogConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from `--config` or the layered `config/labagent.*` sources, then
    /// apply command-line overrides.
    pub fn load(args: &Args) -> labwire_common::Result<Self> {
        let mut config: AgentConfig = match &args.config {
            Some(path) => labwire_common::config::load_config_from_file(path)?,
            None => labwire_common::config::load_config("labagent")?,
        };
        config.apply_args(args);
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(listen) = &args.listen {
            self.listen = listen.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.no_color {
            self.logging.ansi = false;
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(config: Option<PathBuf>) -> Args {
        Args {
            config,
            listen: None,
            log_level: None,
            no_color: false,
            validate: false,
        }
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.listen, "0.0.0.0:7630");
        assert_eq!(config.dispatch.agent_port, DEFAULT_AGENT_PORT);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_file_with_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "listen: 127.0.0.1:9000\nlogging:\n  level: debug\ndispatch:\n  modbus_timeout_ms: 250\n"
        )
        .unwrap();

        let mut cli = args(Some(file.path().to_path_buf()));
        let config = AgentConfig::load(&cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.dispatch.modbus_timeout_ms, 250);
        assert_eq!(config.dispatch.consumer_label, "labwire");

        cli.listen = Some("127.0.0.1:9100".to_string());
        cli.log_level = Some("labwire_core=trace".to_string());
        cli.no_color = true;
        let config = AgentConfig::load(&cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9100");
        assert_eq!(config.logging.level, "labwire_core=trace");
        assert!(!config.logging.ansi);
    }

    #[test]
    fn test_missing_file() {
        let cli = args(Some(PathBuf::from("/nonexistent/labagent.yaml")));
        assert!(AgentConfig::load(&cli).is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Args::parse_from(["labagent", "--listen", "127.0.0.1:7000", "--validate"]);
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:7000"));
        assert!(cli.validate);
    }
}
