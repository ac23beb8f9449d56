//! Configuration module.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `COMMPORT_CONFIG` environment variable (explicit path)
//! 2. `./commport.toml` (current directory)
//! 3. `commport.toml` under the platform config directory
//!    (`~/.config/commport/` on Linux, the equivalents on macOS/Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `COMMPORT_<SECTION>_<KEY>`
//!
//! Examples:
//! - `COMMPORT_PORT_TIMEOUT_MS=2500`
//! - `COMMPORT_SERIAL_DEVICE=/dev/ttyUSB1`
//! - `COMMPORT_TCP_CONNECT=192.168.0.40:7700`
//!
//! # Example
//!
//! ```rust,no_run
//! use commport::config::ConfigLoader;
//!
//! # fn main() -> commport::config::ConfigResult<()> {
//! // Load configuration with automatic resolution
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Wait timeout: {:?}", config.port.timeout());
//! println!("Serial baud: {}", config.serial.baud);
//!
//! // Or load with defaults only
//! let loader = ConfigLoader::with_defaults();
//! # let _ = loader;
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, DeviceCfg, LogFormat, LoggingCfg, MonitorCfg, PortCfg, SerialCfg, TcpCfg,
};
