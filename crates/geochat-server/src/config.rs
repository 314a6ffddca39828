//! Server configuration.
//!
//! Configuration is layered:
//! - Built-in defaults
//! - TOML configuration file (`--config <path>`, otherwise the first of
//!   `geochat.toml`, `/etc/geochat/geochat.toml`,
//!   `~/.config/geochat/geochat.toml`)
//! - Environment variables (`GEOCHAT_PORT`, `GEOCHAT_LIMITS__MAX_CONNECTIONS`, ...)

use anyhow::{Context, Result};
use clap::Parser;
use geochat_core::geo::DEFAULT_PRECISION;
use geochat_core::RouterConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default configuration file locations, in priority order.
const CONFIG_PATHS: [&str; 3] = [
    "geochat.toml",
    "/etc/geochat/geochat.toml",
    "~/.config/geochat/geochat.toml",
];

/// Command-line arguments of the `geochat` binary.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "geochat", version, about = "Location-partitioned realtime chat server")]
pub struct Cli {
    /// Path to TOML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Load the configuration these arguments select.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file is missing or invalid.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Channel grid configuration.
    #[serde(default)]
    pub grid: GridConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Frames buffered per connection before deliveries to it are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

/// Channel grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Decimal places kept when keying channels.
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Send "user-left" to the old channel when a client relocates.
    #[serde(default)]
    pub announce_relocation: bool,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval advertised to clients, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Connections silent for this long are closed, in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    16 * 1024 // 16 KB
}

fn default_outbound_queue() -> usize {
    256
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_heartbeat_timeout() -> u64 {
    90_000 // 90 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            grid: GridConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            announce_relocation: false,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, overlaid with
    /// `GEOCHAT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists());

        Self::layered(file.as_deref().map(Path::new))
    }

    /// Load a specific file, overlaid with environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        Self::layered(Some(path))
    }

    fn layered(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            tracing::debug!("Loading configuration from {}", path.display());
            builder = builder
                .add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GEOCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a TOML file only, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Router settings derived from this configuration.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            precision: self.grid.precision,
            announce_relocation: self.grid.announce_relocation,
            max_connections: self.limits.max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_flag() {
        let cli = Cli::try_parse_from(["geochat", "--config", "/tmp/geochat.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/geochat.toml")));

        let cli = Cli::try_parse_from(["geochat", "--config=alt.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));

        let cli = Cli::try_parse_from(["geochat"]).unwrap();
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_cli_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["geochat", "--config"]).is_err());
        assert!(Cli::try_parse_from(["geochat", "--port", "1"]).is_err());
        assert!(Cli::try_parse_from(["geochat", "stray"]).is_err());
    }

    #[test]
    fn test_cli_missing_config_file() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/geochat.toml")),
        };
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.grid.precision, 3);
        assert!(!config.grid.announce_relocation);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 50000

            [grid]
            announce_relocation = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.limits.outbound_queue, 256);
        assert_eq!(config.grid.precision, 3);

        let router = config.router_config();
        assert!(router.announce_relocation);
        assert_eq!(router.max_connections, 50000);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("geochat-test-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 7001\n[heartbeat]\ntimeout_ms = 5000\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.heartbeat.timeout_ms, 5000);
        assert_eq!(config.heartbeat.interval_ms, 30_000);

        let layered = Config::load_from(&path).unwrap();
        assert_eq!(layered.heartbeat.timeout_ms, 5000);

        std::fs::remove_file(&path).unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
