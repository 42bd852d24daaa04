//! Configuration for the txt-io driver
//!
//! Loads configuration from a TOML file. Transport selection is explicit:
//! the driver never searches for a device, it uses whatever `[connection]` names.

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_KEEP_ALIVE_MS, DEFAULT_PORT, DEFAULT_TIMEOUT_MS,
    DEFAULT_UPDATE_INTERVAL_MS, MAX_UNITS,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level driver configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub exchange: ExchangeConfig,
    pub camera: CameraConfig,
    pub logging: LoggingConfig,
}

/// Wire variant used for the exchange loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain TCP socket protocol (one unit)
    Tcp,
    /// Direct serial link to the motor shield
    Serial,
    /// Delta-compressed TCP protocol (master plus extension)
    Compressed,
}

/// Connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Which protocol to speak
    pub transport: TransportKind,
    /// Controller host for the TCP variants
    pub host: String,
    /// Controller port; the camera stream uses `port + 1`
    pub port: u16,
    /// Serial device for the direct variant
    pub serial_port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Socket / serial read timeout in milliseconds
    pub timeout_ms: u64,
}

/// Exchange loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Sleep between cycles (device tolerates ~10 ms minimum)
    pub update_interval_ms: u64,
    /// Idle period after which the keep-alive task sends a status query
    pub keep_alive_ms: u64,
    /// Number of units on the bus (1 = master only, 2 = master + extension)
    pub extension_units: usize,
}

/// Camera stream parameters sent with the start request
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: i32,
    pub height: i32,
    pub framerate: i32,
    /// 0 = auto, 1 = 50 Hz, 2 = 60 Hz
    pub power_line_freq: i32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            serial_port: "/dev/ttyO2".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
            extension_units: 1,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            framerate: 15,
            power_line_freq: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// `host:port` of the command socket
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port+1` of the camera socket
    pub fn camera_address(&self) -> String {
        format!("{}:{}", self.host, self.port.wrapping_add(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ExchangeConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// Missing sections and keys fall back to their defaults.
    ///
    /// # Example
    /// ```no_run
    /// use txt_io::config::Config;
    ///
    /// let config = Config::load("txt-io.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the driver cannot work with
    pub fn validate(&self) -> Result<()> {
        let units = self.exchange.extension_units;
        if units == 0 || units > MAX_UNITS {
            return Err(Error::Config(format!(
                "extension_units must be 1..={}, got {}",
                MAX_UNITS, units
            )));
        }
        if units > 1 && self.connection.transport != TransportKind::Compressed {
            return Err(Error::Config(
                "extension units require the compressed transport".to_string(),
            ));
        }
        if self.connection.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.transport, TransportKind::Tcp);
        assert_eq!(config.connection.address(), "127.0.0.1:65000");
        assert_eq!(config.connection.camera_address(), "127.0.0.1:65001");
        assert_eq!(config.connection.serial_port, "/dev/ttyO2");
        assert_eq!(config.connection.baud_rate, 230_000);
        assert_eq!(config.exchange.update_interval_ms, 10);
        assert_eq!(config.exchange.extension_units, 1);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[connection]"));
        assert!(toml_string.contains("[exchange]"));
        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("transport = \"tcp\""));
    }

    #[test]
    fn test_toml_deserialization_partial() {
        let toml_content = r#"
[connection]
transport = "compressed"
host = "192.168.7.2"

[exchange]
extension_units = 2
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.connection.transport, TransportKind::Compressed);
        assert_eq!(config.connection.host, "192.168.7.2");
        assert_eq!(config.connection.port, 65000);
        assert_eq!(config.exchange.extension_units, 2);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_extension_on_plain_socket() {
        let mut config = Config::default();
        config.exchange.extension_units = 2;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.exchange.extension_units = 3;
        config.connection.transport = TransportKind::Compressed;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txt-io.toml");

        let mut config = Config::default();
        config.connection.transport = TransportKind::Serial;
        config.exchange.update_interval_ms = 20;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.connection.transport, TransportKind::Serial);
        assert_eq!(loaded.exchange.update_interval_ms, 20);
    }
}
