//! tailscalesd - Prometheus HTTP service discovery for Tailscale
//!
//! This binary can:
//! - Serve tailnet devices as Prometheus HTTP SD targets
//! - Print the current targets once, for debugging relabeling rules
//! - Show the effective configuration

mod cli;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::{Config, SourceConfig};
use std::sync::Arc;
use tailscalesd_core::{DiscoverySource, PollingCache, Translator};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tailscalesd={},tailscalesd_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .init();

    let config = Config::load(&cli.options, cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(config).await,
        Commands::Targets => cmd_targets(config).await,
        Commands::Config => cmd_config(&config),
    }
}

async fn cmd_serve(config: Config) -> Result<()> {
    let source = config.build_source()?;
    tracing::info!(
        "Starting tailscalesd: refreshing devices from {} at most every {}",
        source.name(),
        humantime::format_duration(config.poll_interval)
    );

    let shutdown = CancellationToken::new();
    server::spawn_signal_handler(shutdown.clone());

    let state = server::AppState::new(
        PollingCache::new(source, config.poll_interval),
        Translator::default(),
        config.request_timeout,
        shutdown,
    );
    server::serve(config.address, state).await
}

async fn cmd_targets(config: Config) -> Result<()> {
    let source: Arc<dyn DiscoverySource> = config.build_source()?;
    let devices = source
        .devices()
        .await
        .with_context(|| format!("Failed to discover devices from {}", source.name()))?;

    let targets = Translator::default().translate(&devices);
    println!("{}", serde_json::to_string_pretty(&targets)?);
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file:      {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("none (default location: {})", config::get_config_file_path_string()))
    );
    println!("Listen address:   {}", config.address);
    println!("Poll interval:    {}", humantime::format_duration(config.poll_interval));
    println!("Request timeout:  {}", humantime::format_duration(config.request_timeout));
    match &config.source {
        SourceConfig::Local { socket } => {
            println!("Source:           tailscaled local API");
            println!("Socket:           {}", socket.display());
        }
        SourceConfig::Public {
            api_base, tailnet, ..
        } => {
            println!("Source:           Tailscale public API");
            println!("API base:         {}", api_base);
            println!("Tailnet:          {}", tailnet);
            println!("Token:            <redacted>");
        }
    }
    println!();
    println!("Example config.toml:");
    println!();
    println!("{}", config::generate_example_config());
    Ok(())
}
