//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_READER";

/// Config file name inside the application config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the current directory
const LOCAL_CONFIG_FILE_NAME: &str = "serial-reader.toml";

const APP_DIR_NAME: &str = "serial-port-reader";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_READER_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using the standard resolution order.
    ///
    /// Environment variables override any file values. The result is
    /// validated before it is returned.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

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
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self.config_path.as_ref().ok_or(ConfigError::NoPath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::Parse)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(section: &str, key: &str) -> (String, Option<String>) {
    let name = format!("{ENV_PREFIX}_{section}_{key}");
    let value = std::env::var(&name).ok();
    (name, value)
}

fn parse_env<T: FromStr>(name: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(name, format!("Invalid {what}: '{value}'")))
}

fn parse_env_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(name, format!("Invalid boolean: '{value}'"))),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `SERIAL_READER_<SECTION>_<KEY>`, for example
/// `SERIAL_READER_SERIAL_POLL_INTERVAL_MS=100`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let (name, Some(val)) = env_var("SERIAL", "DEFAULT_BAUD") {
        config.serial.default_baud = parse_env(&name, &val, "baud rate")?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "POLL_INTERVAL_MS") {
        config.serial.poll_interval_ms = parse_env(&name, &val, "interval")?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "TICK_INTERVAL_MS") {
        config.serial.tick_interval_ms = parse_env(&name, &val, "interval")?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "STRIP_TERMINATORS") {
        config.serial.strip_terminators = parse_env_bool(&name, &val)?;
    }
    if let (_, Some(val)) = env_var("SERIAL", "PORT_PREFIX") {
        config.serial.port_prefix = val;
    }

    // Monitor overrides
    if let (name, Some(val)) = env_var("MONITOR", "USE_HIGHEST_PORT") {
        config.monitor.use_highest_port = parse_env_bool(&name, &val)?;
    }
    if let (_, Some(val)) = env_var("MONITOR", "PORT") {
        config.monitor.port = Some(val);
    }
    if let (name, Some(val)) = env_var("MONITOR", "SHOW_TIMESTAMPS") {
        config.monitor.show_timestamps = parse_env_bool(&name, &val)?;
    }

    // Logging overrides
    if let (_, Some(val)) = env_var("LOGGING", "LEVEL") {
        config.logging.level = val;
    }
    if let (name, Some(val)) = env_var("LOGGING", "FORMAT") {
        config.logging.format = val
            .parse()
            .map_err(|_| ConfigError::env(name, format!("Invalid log format: '{val}'")))?;
    }

    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.default_baud, 9600);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIAL_READER_SERIAL_DEFAULT_BAUD", "57600");
        env::set_var("SERIAL_READER_MONITOR_PORT", "COM7");
        env::set_var("SERIAL_READER_LOGGING_FORMAT", "compact");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.default_baud, 57600);
        assert_eq!(loader.config().monitor.port.as_deref(), Some("COM7"));
        assert_eq!(loader.config().logging.format, LogFormat::Compact);

        env::remove_var("SERIAL_READER_SERIAL_DEFAULT_BAUD");
        env::remove_var("SERIAL_READER_MONITOR_PORT");
        env::remove_var("SERIAL_READER_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        env::set_var("SERIAL_READER_SERIAL_STRIP_TERMINATORS", "sometimes");

        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
        assert!(err.to_string().contains("SERIAL_READER_SERIAL_STRIP_TERMINATORS"));

        env::remove_var("SERIAL_READER_SERIAL_STRIP_TERMINATORS");
    }

    #[test]
    #[serial]
    fn test_save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut loader = ConfigLoader::with_defaults();
        loader.config_mut().serial.poll_interval_ms = 500;
        loader.save_to(&path).unwrap();

        let mut reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.poll_interval_ms, 500);

        std::fs::write(&path, "[monitor]\nshow_timestamps = false\n").unwrap();
        reloaded.reload().unwrap();
        assert!(!reloaded.config().monitor.show_timestamps);
        assert_eq!(reloaded.config().serial.poll_interval_ms, 0);
    }

    #[test]
    #[serial]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_from(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[serial]\ndefault_baud = 0\n").unwrap();

        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    #[serial]
    fn test_explicit_path_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[serial]\nport_prefix = \"/dev/ttyACM\"\n").unwrap();
        env::set_var(CONFIG_PATH_ENV, &path);

        let loader = ConfigLoader::load().unwrap();
        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(loader.config().serial.port_prefix, "/dev/ttyACM");

        env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    fn test_save_without_path_fails() {
        let loader = ConfigLoader {
            config_path: None,
            config: Config::default(),
        };
        assert!(matches!(loader.save(), Err(ConfigError::NoPath)));
    }
}
