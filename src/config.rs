//! Runtime configuration.
//!
//! Each setting is taken from, in order:
//! 1. Command-line flag or its environment variable
//! 2. Config file (`--config`, or ~/.config/tailscalesd/config.toml if it exists)
//! 3. Built-in default

use crate::cli::Options;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tailscalesd_core::{
    DiscoverySource, LocalApiSource, PublicApiSource, DEFAULT_API_BASE, DEFAULT_LOCALAPI_SOCKET,
    DEFAULT_POLL_INTERVAL,
};

/// Default listen address
const DEFAULT_ADDRESS: &str = "0.0.0.0:9242";

/// Default time a discovery request waits on a refresh before answering from
/// the last snapshot
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single call to the upstream API
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("the public API needs both a tailnet (--tailnet / TAILNET) and an API token (--token / TAILSCALE_API_TOKEN); use --localapi to query tailscaled instead")]
    MissingCredentials,

    #[error("invalid listen address {value:?}: {source}")]
    InvalidAddress {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,

    #[error("failed to read config file {path:?}: {message}")]
    ConfigFile { path: PathBuf, message: String },
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    address: Option<String>,
    #[serde(with = "humantime_serde")]
    poll: Option<Duration>,
    localapi: Option<bool>,
    localapi_socket: Option<PathBuf>,
    tailnet: Option<String>,
    token: Option<String>,
    api_base: Option<String>,
    #[serde(with = "humantime_serde")]
    request_timeout: Option<Duration>,
}

/// Which discovery source to use, and how to reach it
#[derive(Clone, PartialEq)]
pub enum SourceConfig {
    Local {
        socket: PathBuf,
    },
    Public {
        api_base: String,
        tailnet: String,
        token: String,
    },
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::Local { socket } => f.debug_struct("Local").field("socket", socket).finish(),
            SourceConfig::Public {
                api_base, tailnet, ..
            } => f
                .debug_struct("Public")
                .field("api_base", api_base)
                .field("tailnet", tailnet)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub address: SocketAddr,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub source: SourceConfig,
    /// Config file that contributed to this configuration, if any
    pub config_file: Option<PathBuf>,
}

impl Config {
    /// Load the config file (if any) and merge it with the command line.
    pub fn load(options: &Options, config_path: Option<&Path>) -> Result<Config, ConfigError> {
        let (file, path) = match config_path {
            Some(path) => (load_config_file(path)?, Some(path.to_path_buf())),
            None => match default_config_file_path().filter(|p| p.exists()) {
                Some(path) => (load_config_file(&path)?, Some(path)),
                None => (ConfigFile::default(), None),
            },
        };

        let mut config = Config::resolve(options, file)?;
        config.config_file = path;
        Ok(config)
    }

    /// Merge flags over file values over defaults, and validate the result.
    pub fn resolve(options: &Options, file: ConfigFile) -> Result<Config, ConfigError> {
        let address = options
            .address
            .clone()
            .or(file.address)
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let address = parse_address(&address)?;

        let poll_interval = options.poll.or(file.poll).unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        let request_timeout = options
            .request_timeout
            .or(file.request_timeout)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::ZeroRequestTimeout);
        }

        let source = if options.localapi.or(file.localapi).unwrap_or(false) {
            SourceConfig::Local {
                socket: options
                    .localapi_socket
                    .clone()
                    .or(file.localapi_socket)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCALAPI_SOCKET)),
            }
        } else {
            let tailnet = non_empty(options.tailnet.clone().or(file.tailnet));
            let token = non_empty(options.token.clone().or(file.token));
            let (Some(tailnet), Some(token)) = (tailnet, token) else {
                return Err(ConfigError::MissingCredentials);
            };
            SourceConfig::Public {
                api_base: non_empty(options.api_base.clone().or(file.api_base))
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                tailnet,
                token,
            }
        };

        Ok(Config {
            address,
            poll_interval,
            request_timeout,
            source,
            config_file: None,
        })
    }

    /// Construct the configured discovery source.
    pub fn build_source(&self) -> anyhow::Result<Arc<dyn DiscoverySource>> {
        match &self.source {
            SourceConfig::Local { socket } => {
                tracing::info!("Using tailscaled local API at {:?}", socket);
                Ok(Arc::new(LocalApiSource::new(socket.clone(), UPSTREAM_TIMEOUT)))
            }
            SourceConfig::Public {
                api_base,
                tailnet,
                token,
            } => {
                tracing::info!("Using Tailscale public API at {} for tailnet {}", api_base, tailnet);
                let source = PublicApiSource::new(api_base, tailnet.clone(), token.clone(), UPSTREAM_TIMEOUT)?;
                Ok(Arc::new(source))
            }
        }
    }
}

/// Accepts "host:port", or ":port" to listen on every interface.
fn parse_address(value: &str) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    let candidate = if value.starts_with(':') {
        format!("0.0.0.0{}", value)
    } else {
        value.to_string()
    };
    candidate
        .parse()
        .map_err(|source| ConfigError::InvalidAddress {
            value: value.to_string(),
            source,
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get the path to the default configuration file
fn default_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("tailscalesd").join("config.toml"))
}

/// Load configuration from a config file
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::ConfigFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let config = toml::from_str(&content).map_err(|e| ConfigError::ConfigFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    default_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/tailscalesd/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# tailscalesd configuration
# Place this file at: ~/.config/tailscalesd/config.toml
# Command-line flags and environment variables override these values.

# Address to serve Prometheus discovery on
# address = "0.0.0.0:9242"

# Minimum time between device list refreshes
# poll = "5m"

# How long a discovery request may wait on a refresh
# request_timeout = "10s"

# Query the tailscaled local API instead of the public API
# localapi = false
# localapi_socket = "/var/run/tailscale/tailscaled.sock"

# Public API settings
# tailnet = "example.com"
# token = "tskey-api-..."
# api_base = "https://api.tailscale.com"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public_options() -> Options {
        Options {
            tailnet: Some("example.com".to_string()),
            token: Some("tskey-api-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(&public_options(), ConfigFile::default()).unwrap();

        assert_eq!(config.address, "0.0.0.0:9242".parse::<SocketAddr>().unwrap());
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(
            config.source,
            SourceConfig::Public {
                api_base: "https://api.tailscale.com".to_string(),
                tailnet: "example.com".to_string(),
                token: "tskey-api-secret".to_string(),
            }
        );
    }

    #[test]
    fn test_flags_override_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            address = "127.0.0.1:8000"
            poll = "1m"
            tailnet = "from-file.example"
            token = "file-token"
            "#,
        )
        .unwrap();
        let options = Options {
            poll: Some(Duration::from_secs(30)),
            tailnet: Some("from-flag.example".to_string()),
            ..Default::default()
        };

        let config = Config::resolve(&options, file).unwrap();
        assert_eq!(config.address, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        match config.source {
            SourceConfig::Public { tailnet, token, .. } => {
                assert_eq!(tailnet, "from-flag.example");
                assert_eq!(token, "file-token");
            }
            other => panic!("expected public source, got {:?}", other),
        }
    }

    #[test]
    fn test_localapi_needs_no_credentials() {
        let options = Options {
            localapi: Some(true),
            ..Default::default()
        };
        let config = Config::resolve(&options, ConfigFile::default()).unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Local {
                socket: PathBuf::from("/var/run/tailscale/tailscaled.sock"),
            }
        );
    }

    #[test]
    fn test_missing_credentials() {
        let options = Options {
            tailnet: Some("example.com".to_string()),
            token: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(&options, ConfigFile::default()),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn test_port_only_address() {
        let options = Options {
            address: Some(":9100".to_string()),
            ..public_options()
        };
        let config = Config::resolve(&options, ConfigFile::default()).unwrap();
        assert_eq!(config.address, "0.0.0.0:9100".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_invalid_values() {
        let options = Options {
            address: Some("localhost".to_string()),
            ..public_options()
        };
        assert!(matches!(
            Config::resolve(&options, ConfigFile::default()),
            Err(ConfigError::InvalidAddress { .. })
        ));

        let options = Options {
            poll: Some(Duration::ZERO),
            ..public_options()
        };
        assert!(matches!(
            Config::resolve(&options, ConfigFile::default()),
            Err(ConfigError::ZeroPollInterval)
        ));
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "localapi = true\nlocalapi_socket = \"/tmp/ts.sock\"\nrequest_timeout = \"2s\"\n",
        )
        .unwrap();

        let config = Config::load(&Options::default(), Some(path.as_path())).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(
            config.source,
            SourceConfig::Local {
                socket: PathBuf::from("/tmp/ts.sock"),
            }
        );
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_load_config_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "pol = \"5m\"\n").unwrap();

        assert!(matches!(
            Config::load(&Options::default(), Some(path.as_path())),
            Err(ConfigError::ConfigFile { .. })
        ));
    }

    #[test]
    fn test_example_config_parses() {
        let file: ConfigFile = toml::from_str(&generate_example_config()).unwrap();
        assert!(file.address.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config::resolve(&public_options(), ConfigFile::default()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("tskey-api-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
