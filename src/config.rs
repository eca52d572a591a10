//! Configuration module for socket-comms.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::encoding::Encoding;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "socket-comms")]
#[command(author = "socket-comms authors")]
#[command(version = "0.1.0")]
#[command(about = "Readiness-multiplexed echo server and prompt client", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub mode: Mode,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Host to connect to or bind on
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to connect to or bind on
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Address family
    #[arg(long, value_enum, global = true)]
    pub address_family: Option<AddressFamily>,

    /// Maximum bytes moved per send/receive call
    #[arg(short, long, global = true)]
    pub buffer_size: Option<usize>,

    /// Text encoding (utf-8, ascii, latin-1)
    #[arg(short, long, global = true)]
    pub encoding: Option<String>,

    /// Poll timeout in seconds, or "none" to wait indefinitely (ignored
    /// with --blocking)
    #[arg(short, long, global = true)]
    pub timeout: Option<Timeout>,

    /// Emit per-connection diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Wait for readiness without a timeout
    #[arg(long, global = true)]
    pub blocking: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Which side of the conversation to run
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Listen and echo everything back to the sender
    Server,
    /// Connect and send lines typed on stdin
    Client,
}

/// Address family of the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn name(self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        }
    }

    pub fn matches(self, addr: &SocketAddr) -> bool {
        matches!(
            (self, addr),
            (AddressFamily::Ipv4, SocketAddr::V4(_)) | (AddressFamily::Ipv6, SocketAddr::V6(_))
        )
    }

    pub(crate) fn domain(self) -> socket2::Domain {
        match self {
            AddressFamily::Ipv4 => socket2::Domain::IPV4,
            AddressFamily::Ipv6 => socket2::Domain::IPV6,
        }
    }
}

/// Kind of socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    #[default]
    Stream,
    Datagram,
}

/// Poll timeout as written in the config file or on the command line:
/// seconds, or `none` for no timeout.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "TimeoutValue")]
pub struct Timeout(pub Option<f64>);

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeoutValue {
    Seconds(f64),
    Keyword(String),
}

impl TryFrom<TimeoutValue> for Timeout {
    type Error = String;

    fn try_from(value: TimeoutValue) -> Result<Self, Self::Error> {
        match value {
            TimeoutValue::Seconds(secs) => Ok(Timeout(Some(secs))),
            TimeoutValue::Keyword(word) => word.parse(),
        }
    }
}

impl FromStr for Timeout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Timeout(None));
        }
        s.parse::<f64>()
            .map(|secs| Timeout(Some(secs)))
            .map_err(|_| format!("expected seconds or \"none\", got '{s}'"))
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub socket: SocketSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Socket-related configuration
#[derive(Debug, Deserialize)]
pub struct SocketSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub address_family: AddressFamily,
    #[serde(default)]
    pub socket_kind: SocketKind,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Poll timeout in seconds, or "none"
    #[serde(default = "default_timeout")]
    pub timeout: Timeout,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
    /// Liveness sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: f64,
}

impl Default for SocketSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            address_family: AddressFamily::default(),
            socket_kind: SocketKind::default(),
            buffer_size: default_buffer_size(),
            encoding: default_encoding(),
            timeout: default_timeout(),
            verbose: false,
            blocking: false,
            backlog: default_backlog(),
            events_capacity: default_events_capacity(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    65432
}

fn default_buffer_size() -> usize {
    1024
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_timeout() -> Timeout {
    Timeout(Some(1.0))
}

fn default_backlog() -> i32 {
    128
}

fn default_events_capacity() -> usize {
    256
}

fn default_sweep_interval() -> f64 {
    5.0
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved, immutable socket configuration consumed by both roles.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub host: String,
    pub port: u16,
    pub address_family: AddressFamily,
    pub socket_kind: SocketKind,
    /// Maximum bytes per send/receive call
    pub buffer_size: usize,
    pub encoding: Encoding,
    /// Poll timeout; ignored when `blocking` is set
    pub timeout: Option<Duration>,
    /// Gates diagnostic output only
    pub verbose: bool,
    pub blocking: bool,
    pub backlog: i32,
    pub events_capacity: usize,
    pub sweep_interval: Duration,
    pub log_level: String,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            address_family: AddressFamily::default(),
            socket_kind: SocketKind::default(),
            buffer_size: default_buffer_size(),
            encoding: Encoding::default(),
            timeout: Some(Duration::from_secs(1)),
            verbose: false,
            blocking: false,
            backlog: default_backlog(),
            events_capacity: default_events_capacity(),
            sweep_interval: Duration::from_secs_f64(default_sweep_interval()),
            log_level: default_log_level(),
        }
    }
}

impl SocketConfig {
    /// Configuration for `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// How long a single readiness wait may block.
    ///
    /// `None` means wait indefinitely, either because blocking mode is on
    /// or because no timeout is configured.
    pub fn poll_timeout(&self) -> Option<Duration> {
        if self.blocking {
            None
        } else {
            self.timeout
        }
    }

    /// Reject values the event loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }
        if self.events_capacity == 0 {
            return Err(ConfigError::InvalidEventsCapacity);
        }
        Ok(())
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub socket: SocketConfig,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        let file = toml_config.socket;
        let encoding_name = cli.encoding.unwrap_or(file.encoding);
        let encoding = encoding_name
            .parse::<Encoding>()
            .map_err(|e| ConfigError::UnknownEncoding(e.0))?;

        let socket = SocketConfig {
            host: cli.host.unwrap_or(file.host),
            port: cli.port.unwrap_or(file.port),
            address_family: cli.address_family.unwrap_or(file.address_family),
            socket_kind: file.socket_kind,
            buffer_size: cli.buffer_size.unwrap_or(file.buffer_size),
            encoding,
            timeout: cli.timeout.unwrap_or(file.timeout).0.map(seconds).transpose()?,
            verbose: cli.verbose || file.verbose,
            blocking: cli.blocking || file.blocking,
            backlog: file.backlog,
            events_capacity: file.events_capacity,
            sweep_interval: seconds(file.sweep_interval)?,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        socket.validate()?;

        Ok(Config {
            mode: cli.mode,
            socket,
        })
    }
}

fn seconds(value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration(value))
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("buffer size must be greater than zero")]
    InvalidBufferSize,

    #[error("events capacity must be greater than zero")]
    InvalidEventsCapacity,

    #[error("invalid duration: {0} seconds")]
    InvalidDuration(f64),
}
