//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults,
//! plus the projections into the runtime types ([`PortSettings`],
//! [`LineParams`]) the rest of the crate consumes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::port::monitor::MonitorMode;
use crate::port::settings::{PortSettings, DEFAULT_PUSHBACK_CAPACITY};
use crate::transport::device::SttyMode;
use crate::transport::serial::{DataBits, FlowControl, LineParams, Parity, StopBits};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine settings shared by every transport
    pub port: PortCfg,
    /// Serial line configuration
    pub serial: SerialCfg,
    /// Device-file transport configuration
    pub device: DeviceCfg,
    /// TCP client/server configuration
    pub tcp: TcpCfg,
    /// Logging configuration
    pub logging: LoggingCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: PortCfg::default(),
            serial: SerialCfg::default(),
            device: DeviceCfg::default(),
            tcp: TcpCfg::default(),
            logging: LoggingCfg::default(),
        }
    }
}

impl Config {
    /// Project the `[port]` section into engine settings.
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            label: None,
            timeout: self.port.timeout(),
            pushback_capacity: self.port.pushback_capacity,
            monitor: self.port.monitor.into(),
        }
    }

    /// Project the `[serial]` section into line parameters.
    pub fn line_params(&self) -> LineParams {
        LineParams {
            baud: self.serial.baud,
            data_bits: self.serial.data_bits,
            stop_bits: self.serial.stop_bits,
            parity: self.serial.parity,
            flow_control: self.serial.flow_control,
        }
    }

    /// Cross-field checks that serde can't express.
    pub fn validate(&self) -> Result<(), super::error::ConfigError> {
        self.line_params()
            .validate()
            .map_err(|e| super::error::ConfigError::validation("serial", e.to_string()))?;
        Ok(())
    }
}

/// Engine settings section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortCfg {
    /// Deadline for implicit-timeout waits, in milliseconds
    pub timeout_ms: u64,
    /// Pushback buffer capacity in bytes
    pub pushback_capacity: usize,
    /// Monitor wiring: "off", "shared", or "split"
    pub monitor: MonitorCfg,
}

impl Default for PortCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            pushback_capacity: DEFAULT_PUSHBACK_CAPACITY,
            monitor: MonitorCfg::Off,
        }
    }
}

impl PortCfg {
    /// Get the wait timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Monitor wiring selector for config files.
///
/// Caller-supplied queues can't come from a file, so this covers the three
/// declarative modes; code that needs custom queues builds a
/// [`MonitorMode::Custom`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorCfg {
    Off,
    Shared,
    Split,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self::Off
    }
}

impl From<MonitorCfg> for MonitorMode {
    fn from(cfg: MonitorCfg) -> Self {
        match cfg {
            MonitorCfg::Off => MonitorMode::Off,
            MonitorCfg::Shared => MonitorMode::Shared,
            MonitorCfg::Split => MonitorMode::Split,
        }
    }
}

impl FromStr for MonitorCfg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "shared" => Ok(Self::Shared),
            "split" => Ok(Self::Split),
            other => Err(format!("unknown monitor mode '{other}'")),
        }
    }
}

/// Serial line configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialCfg {
    /// Device to open (`/dev/ttyUSB0`, `COM3`, or an alias)
    pub device: Option<String>,
    /// Baud rate
    pub baud: u32,
    /// Data bits: "five" through "eight"
    pub data_bits: DataBits,
    /// Stop bits: "one" or "two"
    pub stop_bits: StopBits,
    /// Parity: "none", "even", "odd", "mark", "space"
    pub parity: Parity,
    /// Flow control: "none", "software", "hardware"
    pub flow_control: FlowControl,
    /// Device aliases for convenience
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            device: None,
            baud: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            aliases: HashMap::new(),
        }
    }
}

impl SerialCfg {
    /// Resolve a device name through aliases
    pub fn resolve_device(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Device-file transport configuration section. Line parameters come from
/// the `[serial]` section; this adds what's specific to the file-based
/// backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Device file to open
    pub path: Option<PathBuf>,
    /// When `stty` runs: "off", "before_open", "after_open"
    pub stty: SttyMode,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            path: None,
            stty: SttyMode::Off,
        }
    }
}

/// TCP configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpCfg {
    /// Address to dial as a client (`host:port`)
    pub connect: Option<String>,
    /// Address to listen on as a server (`host:port`)
    pub listen: Option<String>,
    /// How long an accept waits for an inbound connection, in milliseconds
    pub accept_wait_ms: u64,
}

impl Default for TcpCfg {
    fn default() -> Self {
        Self {
            connect: None,
            listen: None,
            accept_wait_ms: 30_000,
        }
    }
}

impl TcpCfg {
    /// Get the accept wait as Duration
    pub fn accept_wait(&self) -> Duration {
        Duration::from_millis(self.accept_wait_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingCfg {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log output format
    pub format: LogFormat,
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port.timeout_ms, 10_000);
        assert_eq!(config.port.pushback_capacity, 4096);
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.tcp.accept_wait_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_settings_projection() {
        let mut config = Config::default();
        config.port.timeout_ms = 250;
        config.port.monitor = MonitorCfg::Shared;

        let settings = config.port_settings();
        assert_eq!(settings.timeout, Duration::from_millis(250));
        assert!(matches!(settings.monitor, MonitorMode::Shared));
    }

    #[test]
    fn test_line_params_projection() {
        let mut config = Config::default();
        config.serial.baud = 115200;
        config.serial.parity = Parity::Even;

        let params = config.line_params();
        assert_eq!(params.baud, 115200);
        assert_eq!(params.parity, Parity::Even);
        assert_eq!(params.data_bits, DataBits::Eight);
    }

    #[test]
    fn test_device_alias_resolution() {
        let mut config = SerialCfg::default();
        config
            .aliases
            .insert("plc".to_string(), "/dev/ttyUSB3".to_string());

        assert_eq!(config.resolve_device("plc"), "/dev/ttyUSB3");
        assert_eq!(config.resolve_device("COM5"), "COM5");
    }

    #[test]
    fn test_validate_rejects_bad_baud() {
        let mut config = Config::default();
        config.serial.baud = 31337;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[port]"));
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[tcp]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [port]
            timeout_ms = 500
            monitor = "split"

            [serial]
            device = "/dev/ttyS1"
            baud = 19200
            parity = "odd"

            [tcp]
            listen = "0.0.0.0:7700"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port.timeout_ms, 500);
        assert_eq!(config.port.monitor, MonitorCfg::Split);
        assert_eq!(config.serial.device.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(config.serial.baud, 19200);
        assert_eq!(config.serial.parity, Parity::Odd);
        assert_eq!(config.tcp.listen.as_deref(), Some("0.0.0.0:7700"));
        // Defaults should still work
        assert_eq!(config.port.pushback_capacity, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_monitor_cfg_from_str() {
        assert_eq!(MonitorCfg::from_str("shared").unwrap(), MonitorCfg::Shared);
        assert_eq!(MonitorCfg::from_str("OFF").unwrap(), MonitorCfg::Off);
        assert!(MonitorCfg::from_str("loud").is_err());
    }
}
