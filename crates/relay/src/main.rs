//! sysrelay - UDP syslog receiver and relay
//!
//! # Usage
//!
//! ```bash
//! # Run with configs/config.toml if present, defaults otherwise
//! sysrelay
//! sysrelay --config configs/config.toml
//!
//! # Override the port and relay target
//! sysrelay --port 1514 --forward 127.0.0.1:49515
//! ```

mod output;
mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sysrelay_config::{Config, LogFormat};

/// Default configuration file, used only when it exists
const DEFAULT_CONFIG_PATH: &str = "configs/config.toml";

/// sysrelay - UDP syslog receiver and relay
#[derive(Parser, Debug)]
#[command(name = "sysrelay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Listen port; overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Relay destination as host:port; overrides the config file
    #[arg(short, long)]
    forward: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(forward) = cli.forward {
        config.listener.forward_target = Some(forward);
    }
    config.validate().context("invalid configuration")?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.log.level.as_str());
    init_logging(level, config.log.format)?;

    serve::run(config).await
}

/// Load the explicit config file, else the default one if present
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::from_file(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("failed to load config from {DEFAULT_CONFIG_PATH}")),
        None => Ok(Config::default()),
    }
}

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr so stdout carries only received messages.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}
