//! Serve command.

use clap::Args;
use std::path::Path;
use switchboard_core::config::{BindMode, Config};
use switchboard_gateway::Gateway;
use tracing::info;

/// Serve command arguments.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind mode (loopback, lan)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port number
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Parse a bind mode name.
fn parse_bind(bind: &str) -> anyhow::Result<BindMode> {
    match bind {
        "loopback" => Ok(BindMode::Loopback),
        "lan" => Ok(BindMode::Lan),
        other => anyhow::bail!("Invalid bind mode: {} (expected loopback or lan)", other),
    }
}

/// Apply command-line overrides and validate.
fn prepare(mut config: Config, args: &ServeArgs) -> anyhow::Result<Config> {
    if let Some(bind) = &args.bind {
        config.server.bind = parse_bind(bind)?;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(config)
}

/// Run the server until interrupted.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = prepare(super::load_config(config_path)?, &args)?;

    info!(
        "Loaded {} agent accounts, {} release options, {} queues",
        config.agents.len(),
        config.release_options.len(),
        config.queues.len()
    );

    let gateway = Gateway::from_config(&config);
    gateway.run().await?;
    Ok(())
}
