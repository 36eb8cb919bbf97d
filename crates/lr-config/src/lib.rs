//! Configuration management for LR.
//!
//! Parses `lr.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Example
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [assets]
//! root_dir = "dist"
//!
//! [live_reload]
//! port = 35729
//! debounce_ms = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override asset server host.
    pub host: Option<String>,
    /// Override asset server port.
    pub port: Option<u16>,
    /// Override root directory.
    pub root_dir: Option<PathBuf>,
    /// Override notification server host.
    pub reload_host: Option<String>,
    /// Override notification server port.
    pub reload_port: Option<u16>,
    /// Override debounce duration in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
    /// Override forced polling.
    pub force_poll: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "lr.toml";

/// Upper bound for `live_reload.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Lower bound for `live_reload.poll_interval_ms`.
const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Asset server configuration.
    pub server: ServerConfig,
    /// Asset configuration (paths are relative strings from TOML).
    assets: AssetsConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved asset configuration (set after loading).
    #[serde(skip)]
    pub assets_resolved: AssetsConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Asset server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

/// Raw asset configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AssetsConfigRaw {
    root_dir: Option<String>,
}

/// Resolved asset configuration with absolute paths.
#[derive(Debug, Default)]
pub struct AssetsConfig {
    /// Build output directory, served and watched.
    pub root_dir: PathBuf,
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Notification server host address.
    pub host: String,
    /// Notification server port.
    pub port: u16,
    /// Quiet period after the last change before clients are notified.
    pub debounce_ms: u64,
    /// Pending notifications buffered per client.
    pub queue_capacity: usize,
    /// Skip native file notifications and poll instead.
    pub force_poll: bool,
    /// Polling interval when polling is in use.
    pub poll_interval_ms: u64,
    /// Insert the agent script tag into served HTML pages.
    pub inject_agent: bool,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_owned(),
            port: 35729,
            debounce_ms: 100,
            queue_capacity: 8,
            force_poll: false,
            poll_interval_ms: 500,
            inject_agent: true,
        }
    }
}

impl LiveReloadConfig {
    /// Debounce quiet period.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a port field to be non-zero.
fn require_port(port: u16, field: &str) -> Result<(), ConfigError> {
    // Port 0 lets the OS pick, which the reload agent could never find
    if port == 0 {
        return Err(ConfigError::Validation(format!("{field} cannot be 0")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `lr.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated after the overrides.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root_dir) = &settings.root_dir {
            self.assets_resolved.root_dir.clone_from(root_dir);
        }
        if let Some(reload_host) = &settings.reload_host {
            self.live_reload.host.clone_from(reload_host);
        }
        if let Some(reload_port) = settings.reload_port {
            self.live_reload.port = reload_port;
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.live_reload.debounce_ms = debounce_ms;
        }
        if let Some(enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = enabled;
        }
        if let Some(force_poll) = settings.force_poll {
            self.live_reload.force_poll = force_poll;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            assets: AssetsConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            assets_resolved: AssetsConfig {
                root_dir: base.join("dist"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically by [`Config::load`] after CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate asset server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        require_port(self.server.port, "server.port")?;
        Ok(())
    }

    /// Validate live reload configuration.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let live_reload = &self.live_reload;
        if !live_reload.enabled {
            return Ok(());
        }

        require_non_empty(&live_reload.host, "live_reload.host")?;
        require_port(live_reload.port, "live_reload.port")?;

        if live_reload.host == self.server.host && live_reload.port == self.server.port {
            return Err(ConfigError::Validation(format!(
                "live_reload address {}:{} conflicts with server address",
                live_reload.host, live_reload.port
            )));
        }

        if live_reload.debounce_ms == 0 || live_reload.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "live_reload.debounce_ms must be between 1 and {MAX_DEBOUNCE_MS}"
            )));
        }

        if live_reload.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "live_reload.queue_capacity must be greater than 0".to_owned(),
            ));
        }

        if live_reload.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "live_reload.poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}"
            )));
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.assets_resolved = AssetsConfig {
            root_dir: resolve(self.assets.root_dir.as_deref(), "dist"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.assets_resolved.root_dir, PathBuf::from("/test/dist"));
        assert!(config.live_reload.enabled);
        assert_eq!(config.live_reload.host, "127.0.0.1");
        assert_eq!(config.live_reload.port, 35729);
        assert_eq!(config.live_reload.debounce(), Duration::from_millis(100));
        assert_eq!(config.live_reload.queue_capacity, 8);
        assert!(!config.live_reload.force_poll);
        assert_eq!(config.live_reload.poll_interval(), Duration::from_millis(500));
        assert!(config.live_reload.inject_agent);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = "";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_parse_server_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_parse_live_reload_config() {
        let toml = r#"
[live_reload]
enabled = false
host = "0.0.0.0"
port = 9001
debounce_ms = 250
queue_capacity = 2
force_poll = true
poll_interval_ms = 1000
inject_agent = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.live_reload.enabled);
        assert_eq!(config.live_reload.host, "0.0.0.0");
        assert_eq!(config.live_reload.port, 9001);
        assert_eq!(config.live_reload.debounce(), Duration::from_millis(250));
        assert_eq!(config.live_reload.queue_capacity, 2);
        assert!(config.live_reload.force_poll);
        assert_eq!(config.live_reload.poll_interval(), Duration::from_secs(1));
        assert!(!config.live_reload.inject_agent);
    }

    #[test]
    fn test_parse_unknown_field_type_fails() {
        let toml = r#"
[live_reload]
debounce_ms = "fast"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let toml = r#"
[assets]
root_dir = "target/web"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.assets_resolved.root_dir,
            PathBuf::from("/project/target/web")
        );
    }

    #[test]
    fn test_resolve_paths_default_root() {
        let mut config: Config = toml::from_str("").unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.assets_resolved.root_dir, PathBuf::from("/project/dist"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[server]
port = 3000

[assets]
root_dir = "out"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.assets_resolved.root_dir, temp_dir.path().join("out"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("missing.toml");

        let err = Config::load(Some(&path), None).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_load_validates_after_cli_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "").unwrap();
        let settings = CliSettings {
            port: Some(35729),
            ..Default::default()
        };

        let err = Config::load(Some(&path), Some(&settings)).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("conflicts"));
    }

    #[test]
    fn test_apply_cli_settings_host() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            host: Some("0.0.0.0".to_owned()),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_root_dir() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            root_dir: Some(PathBuf::from("/custom/dist")),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(
            config.assets_resolved.root_dir,
            PathBuf::from("/custom/dist")
        );
    }

    #[test]
    fn test_apply_cli_settings_live_reload() {
        let mut config = Config::default_with_base(Path::new("/test"));

        let overrides = CliSettings {
            reload_host: Some("0.0.0.0".to_owned()),
            reload_port: Some(9100),
            debounce_ms: Some(50),
            live_reload_enabled: Some(false),
            force_poll: Some(true),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.live_reload.host, "0.0.0.0");
        assert_eq!(config.live_reload.port, 9100);
        assert_eq!(config.live_reload.debounce_ms, 50);
        assert!(!config.live_reload.enabled);
        assert!(config.live_reload.force_poll);
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let config_before = Config::default_with_base(Path::new("/test"));
        let mut config = Config::default_with_base(Path::new("/test"));

        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.server.host, config_before.server.host);
        assert_eq!(config.server.port, config_before.server.port);
        assert_eq!(config.live_reload.port, config_before.live_reload.port);
        assert_eq!(
            config.assets_resolved.root_dir,
            config_before.assets_resolved.root_dir
        );
    }

    // Validation tests

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let result = config.validate();
        assert!(result.is_err(), "Expected validation to fail");
        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(
                msg.contains(s),
                "Expected error to contain '{s}', got: {msg}"
            );
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_server_host_empty() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.host = String::new();
        assert_validation_error(&config, &["server.host", "empty"]);
    }

    #[test]
    fn test_validate_server_port_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;
        assert_validation_error(&config, &["server.port"]);
    }

    #[test]
    fn test_validate_live_reload_port_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.port = 0;
        assert_validation_error(&config, &["live_reload.port"]);
    }

    #[test]
    fn test_validate_live_reload_same_address() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.port = config.server.port;
        assert_validation_error(&config, &["conflicts"]);
    }

    #[test]
    fn test_validate_same_port_different_host_passes() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.host = "127.0.0.2".to_owned();
        config.live_reload.port = config.server.port;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_debounce_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.debounce_ms = 0;
        assert_validation_error(&config, &["debounce_ms"]);
    }

    #[test]
    fn test_validate_debounce_too_high() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.debounce_ms = 60_000;
        assert_validation_error(&config, &["debounce_ms", "10000"]);
    }

    #[test]
    fn test_validate_queue_capacity_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.queue_capacity = 0;
        assert_validation_error(&config, &["queue_capacity"]);
    }

    #[test]
    fn test_validate_poll_interval_too_low() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.poll_interval_ms = 1;
        assert_validation_error(&config, &["poll_interval_ms"]);
    }

    #[test]
    fn test_validate_disabled_live_reload_skips_checks() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.enabled = false;
        config.live_reload.port = 0;
        config.live_reload.debounce_ms = 0;
        assert!(config.validate().is_ok());
    }
}
