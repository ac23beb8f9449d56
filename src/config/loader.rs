//! Configuration loader with file resolution and environment override support.

use std::path::{Path, PathBuf};

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "COMMPORT";

/// Config file name
const CONFIG_FILE_NAME: &str = "commport.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "COMMPORT_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `COMMPORT_CONFIG` environment variable (explicit path)
    /// 2. `./commport.toml` (current directory)
    /// 3. `commport.toml` under the platform config directory
    ///    (`~/.config/commport/` on Linux, the equivalents elsewhere)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("No config file path set".to_string()))?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            self.config = load_from_file(path)?;
            apply_env_overrides(&mut self.config)?;
            self.config.validate()?;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("commport"))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `COMMPORT_<SECTION>_<KEY>`
/// For example:
/// - `COMMPORT_PORT_TIMEOUT_MS=2500`
/// - `COMMPORT_SERIAL_DEVICE=/dev/ttyUSB1`
/// - `COMMPORT_TCP_CONNECT=192.168.0.40:7700`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Port engine overrides
    if let Ok(val) = std::env::var(format!("{}_PORT_TIMEOUT_MS", ENV_PREFIX)) {
        config.port.timeout_ms = val.parse().map_err(|_| {
            ConfigError::env_parse(format!("{}_PORT_TIMEOUT_MS", ENV_PREFIX), "Invalid timeout")
        })?;
    }
    if let Ok(val) = std::env::var(format!("{}_PORT_PUSHBACK_CAPACITY", ENV_PREFIX)) {
        config.port.pushback_capacity = val.parse().map_err(|_| {
            ConfigError::env_parse(
                format!("{}_PORT_PUSHBACK_CAPACITY", ENV_PREFIX),
                "Invalid capacity",
            )
        })?;
    }
    if let Ok(val) = std::env::var(format!("{}_PORT_MONITOR", ENV_PREFIX)) {
        config.port.monitor = val.parse().map_err(|message| {
            ConfigError::env_parse(format!("{}_PORT_MONITOR", ENV_PREFIX), message)
        })?;
    }

    // Serial overrides
    if let Ok(val) = std::env::var(format!("{}_SERIAL_DEVICE", ENV_PREFIX)) {
        config.serial.device = Some(val);
    }
    if let Ok(val) = std::env::var(format!("{}_SERIAL_BAUD", ENV_PREFIX)) {
        config.serial.baud = val.parse().map_err(|_| {
            ConfigError::env_parse(format!("{}_SERIAL_BAUD", ENV_PREFIX), "Invalid baud rate")
        })?;
    }
    if let Ok(val) = std::env::var(format!("{}_SERIAL_PARITY", ENV_PREFIX)) {
        config.serial.parity = val.parse().map_err(|e| {
            ConfigError::env_parse(format!("{}_SERIAL_PARITY", ENV_PREFIX), format!("{e}"))
        })?;
    }

    // TCP overrides
    if let Ok(val) = std::env::var(format!("{}_TCP_CONNECT", ENV_PREFIX)) {
        config.tcp.connect = Some(val);
    }
    if let Ok(val) = std::env::var(format!("{}_TCP_LISTEN", ENV_PREFIX)) {
        config.tcp.listen = Some(val);
    }

    // Logging overrides
    if let Ok(val) = std::env::var(format!("{}_LOGGING_LEVEL", ENV_PREFIX)) {
        config.logging.level = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().port.timeout_ms, 10_000);
        assert!(loader.config_path.is_none());
    }

    #[test]
    fn test_env_override() {
        // Set environment variable
        env::set_var("COMMPORT_SERIAL_DEVICE", "/dev/ttyTEST7");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(
            loader.config().serial.device.as_deref(),
            Some("/dev/ttyTEST7")
        );

        // Clean up
        env::remove_var("COMMPORT_SERIAL_DEVICE");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        env::set_var("COMMPORT_PORT_TIMEOUT_MS_GARBAGE_PROBE", "not-a-number");
        // Unknown variables are ignored entirely.
        let mut config = Config::default();
        assert!(apply_env_overrides(&mut config).is_ok());
        env::remove_var("COMMPORT_PORT_TIMEOUT_MS_GARBAGE_PROBE");
    }

    #[test]
    fn test_save_without_path_is_missing_required() {
        let loader = ConfigLoader::with_defaults();
        assert!(matches!(
            loader.save(),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
