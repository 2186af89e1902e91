//! labagent
//!
//! Runs on the host a GPIO line or Modbus device is attached to and executes
//! backends on behalf of remote labwire dispatch proxies.

mod config;

use anyhow::Context;
use clap::Parser;
use labwire_common::init_logging;
use labwire_core::agent;
use labwire_core::DispatchProxy;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::{AgentConfig, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AgentConfig::load(&args).context("Failed to load labagent configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    info!(
        "labagent {} starting (listen={}, sysfs={}, gpiochips={})",
        env!("CARGO_PKG_VERSION"),
        config.listen,
        config.dispatch.sysfs_prefix,
        config.dispatch.gpiochip_prefix
    );

    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    let proxy = DispatchProxy::new(config.dispatch);
    if let Err(e) = agent::serve(listener, proxy, shutdown_signal()).await {
        error!("Agent stopped: {}", e);
        return Err(e.into());
    }

    info!("labagent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
