use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "tailscalesd")]
#[command(version)]
#[command(about = "Prometheus HTTP service discovery for Tailscale devices")]
#[command(long_about = "
tailscalesd serves the devices of a Tailscale tailnet as Prometheus HTTP
service discovery targets.

Devices come either from the Tailscale public API (needs --tailnet and
--token) or from the tailscaled local API on this node (--localapi).

Quick start:
  tailscalesd --tailnet example.com --token tskey-api-...
  tailscalesd --localapi

Then point a Prometheus http_sd_config at http://<host>:9242/.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file
    #[arg(long, env = "TAILSCALESD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub options: Options,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve discovery targets over HTTP (the default)
    Serve,

    /// Fetch devices once and print the discovery targets as JSON
    Targets,

    /// Show the effective configuration
    Config,
}

/// Settings that may also come from the config file. Anything left unset
/// here falls back to the file, then to the built-in default.
#[derive(Args, Debug, Default, Clone)]
pub struct Options {
    /// Address to serve discovery on, e.g. "0.0.0.0:9242" or ":9242"
    #[arg(long, env = "TAILSCALESD_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Minimum time between device list refreshes, e.g. "30s" or "5m"
    #[arg(long, env = "TAILSCALESD_POLL", value_parser = humantime::parse_duration, global = true)]
    pub poll: Option<Duration>,

    /// Use the tailscaled local API instead of the public API
    #[arg(
        long,
        env = "TAILSCALESD_LOCALAPI",
        num_args = 0..=1,
        default_missing_value = "true",
        global = true
    )]
    pub localapi: Option<bool>,

    /// Path to the tailscaled socket
    #[arg(long, env = "TAILSCALESD_SOCKET", global = true)]
    pub localapi_socket: Option<PathBuf>,

    /// Tailnet to discover devices in (public API only)
    #[arg(long, env = "TAILNET", global = true)]
    pub tailnet: Option<String>,

    /// Tailscale API access token (public API only)
    #[arg(long, env = "TAILSCALE_API_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Base URL of the Tailscale public API
    #[arg(long, env = "TAILSCALESD_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// How long a discovery request may wait on a refresh before answering
    /// from the last snapshot (or failing when there is none)
    #[arg(long, env = "TAILSCALESD_REQUEST_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    pub request_timeout: Option<Duration>,
}
