//! # Configuration Management
//!
//! Centralized configuration for the protocol engine.
//!
//! This module provides structured configuration for the client identity,
//! port assignments, handshake timeouts, command batches and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Example
//! ```toml
//! [client]
//! program = "sdr-link"
//! station = "shack"
//! full_client = true
//! low_bandwidth = false
//! supported_firmware = "3.8.19"
//! connection_timeout = 5000
//! client_ip_timeout = 5000
//! ping_interval = 1000
//!
//! [ports]
//! command = 4992
//! stream = 4991
//!
//! [commands]
//! primary = "all"
//! subscription = { explicit = ["sub slice all", "sub meter all"] }
//! secondary = "none"
//! ```

use crate::error::{ProtocolError, Result};
use crate::protocol::catalog::CommandCatalog;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// TCP port of the radio's command channel on the LAN
pub const DEFAULT_COMMAND_PORT: u16 = 4992;

/// Local UDP port the client receives stream packets on
pub const DEFAULT_STREAM_PORT: u16 = 4991;

/// Firmware version this engine was written against
pub const SUPPORTED_FIRMWARE: &str = "3.8.19";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Client identity and handshake settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Port assignments
    #[serde(default)]
    pub ports: PortConfig,

    /// Command batches sent once attached
    #[serde(default)]
    pub commands: CommandCatalog,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(program) = std::env::var("SDR_LINK_PROGRAM") {
            config.client.program = program;
        }

        if let Ok(station) = std::env::var("SDR_LINK_STATION") {
            config.client.station = station;
        }

        if let Ok(interface) = std::env::var("SDR_LINK_LOCAL_INTERFACE") {
            let ip = interface.parse::<IpAddr>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid SDR_LINK_LOCAL_INTERFACE: {e}"))
            })?;
            config.client.local_interface = Some(ip);
        }

        if let Ok(timeout) = std::env::var("SDR_LINK_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connection_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(port) = std::env::var("SDR_LINK_STREAM_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                config.ports.stream = val;
            }
        }

        if let Ok(low_bw) = std::env::var("SDR_LINK_LOW_BANDWIDTH") {
            config.client.low_bandwidth = matches!(low_bw.as_str(), "1" | "true");
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.ports.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client identity and handshake configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Program name registered with the radio
    pub program: String,

    /// Station name registered with the radio
    pub station: String,

    /// Register as a full GUI client
    pub full_client: bool,

    /// Request a low-bandwidth connection
    pub low_bandwidth: bool,

    /// Local interface to bind; required for WAN hole punching
    #[serde(default)]
    pub local_interface: Option<IpAddr>,

    /// Firmware version the firmware check compares against
    pub supported_firmware: String,

    /// Timeout for TCP connect plus TLS upgrade
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// How long to wait for the `client ip` reply
    #[serde(with = "duration_serde")]
    pub client_ip_timeout: Duration,

    /// Interval between keep-alive pings
    #[serde(with = "duration_serde")]
    pub ping_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: String::from("sdr-link"),
            station: String::from("sdr-link"),
            full_client: true,
            low_bandwidth: false,
            local_interface: None,
            supported_firmware: String::from(SUPPORTED_FIRMWARE),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            client_ip_timeout: timeout::CLIENT_IP_TIMEOUT,
            ping_interval: timeout::KEEPALIVE_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.program.trim().is_empty() {
            errors.push("Program name cannot be empty".to_string());
        } else if self.program.contains(char::is_whitespace) {
            errors.push(format!(
                "Program name cannot contain whitespace: '{}'",
                self.program
            ));
        }

        if self.station.trim().is_empty() {
            errors.push("Station name cannot be empty".to_string());
        } else if self.station.contains(char::is_whitespace) {
            errors.push(format!(
                "Station name cannot contain whitespace: '{}'",
                self.station
            ));
        }

        let parts: Vec<&str> = self.supported_firmware.split('.').collect();
        if parts.len() < 3 || parts.iter().any(|p| p.parse::<u32>().is_err()) {
            errors.push(format!(
                "Invalid supported firmware version: '{}' (expected format: '3.8.19')",
                self.supported_firmware
            ));
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connection_timeout.as_secs() > 60 {
            errors.push("Connection timeout too long (maximum: 60s)".to_string());
        }

        if self.client_ip_timeout.as_millis() < 100 {
            errors.push("Client IP timeout too short (minimum: 100ms)".to_string());
        } else if self.client_ip_timeout > timeout::CLIENT_IP_TIMEOUT {
            errors.push("Client IP timeout too long (maximum: 5s)".to_string());
        }

        if self.ping_interval.as_millis() < 100 {
            errors.push("Ping interval too short (minimum: 100ms)".to_string());
        } else if self.ping_interval.as_secs() > 60 {
            errors.push("Ping interval too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Port assignments
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortConfig {
    /// Radio command port on the LAN
    pub command: u16,

    /// Local UDP port for stream packets on the LAN; 0 picks an ephemeral port
    pub stream: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND_PORT,
            stream: DEFAULT_STREAM_PORT,
        }
    }
}

impl PortConfig {
    /// Validate port configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.command == 0 {
            errors.push("Command port cannot be 0".to_string());
        }

        if self.stream != 0 && self.stream == self.command {
            errors.push(format!(
                "Stream port {} collides with the command port",
                self.stream
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("sdr-link"),
            log_level: Level::INFO,
            log_to_console: true,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.json_format && !self.log_to_console {
            errors.push("json_format has no effect when log_to_console is false".to_string());
        }

        errors
    }
}

/// Durations as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Levels as lowercase names (`"debug"`, `"warn"`)
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Level::from_str(&name).map_err(|_| serde::de::Error::custom(format!("unknown log level {name:?}")))
    }
}
