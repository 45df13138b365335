//! Configuration module for the rule watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RULEWATCH_` and use double
//! underscores to separate nested levels:
//! - `RULEWATCH_WATCH__ROOT=/srv/rules` sets `watch.root`
//! - `RULEWATCH_WATCH__TICK_INTERVAL_MS=2000` sets `watch.tick_interval_ms`
//! - `RULEWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::WatchError;

const ENV_PREFIX: &str = "RULEWATCH_";
const CONFIG_DIR: &str = ".rulewatch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory watching and rebuild cadence
    #[serde(default)]
    pub watch: WatchConfig,

    /// Rule artifact layers
    #[serde(default)]
    pub rules: RulesConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Directory to watch. Absent means the watcher stays disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Watch every subdirectory, including ones created later
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// How often the scheduler drains the watcher
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Longest a single drain may block; must be below the tick interval
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RulesConfig {
    /// Rules shipped with the application, loaded beneath the watched root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `rulewatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_tick_interval_ms() -> u64 { 5000 }
fn default_drain_timeout_ms() -> u64 { 1000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            rules: RulesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: None,
            recursive: true,
            tick_interval_ms: default_tick_interval_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Check the cadence settings.
    ///
    /// The drain must finish inside one tick so the loop stays responsive
    /// to shutdown.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.tick_interval_ms == 0 {
            return Err(WatchError::ConfigError {
                reason: "tick_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.drain_timeout_ms >= self.tick_interval_ms {
            return Err(WatchError::ConfigError {
                reason: format!(
                    "drain_timeout_ms ({}) must be less than tick_interval_ms ({})",
                    self.drain_timeout_ms, self.tick_interval_ms
                ),
            });
        }
        Ok(())
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.rulewatch/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.watch.root.is_none());
        assert!(settings.watch.recursive);
        assert_eq!(settings.watch.tick_interval(), Duration::from_secs(5));
        assert_eq!(settings.watch.drain_timeout(), Duration::from_secs(1));
        assert_eq!(settings.logging.default, "info");
        assert!(settings.watch.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watch]
root = "/srv/rules"
recursive = false
tick_interval_ms = 2000
drain_timeout_ms = 500

[rules]
bundled_dir = "/opt/app/rules"

[logging]
default = "warn"

[logging.modules]
"rulewatch::watcher" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watch.root, Some(PathBuf::from("/srv/rules")));
        assert!(!settings.watch.recursive);
        assert_eq!(settings.watch.tick_interval_ms, 2000);
        assert_eq!(settings.watch.drain_timeout_ms, 500);
        assert_eq!(settings.rules.bundled_dir, Some(PathBuf::from("/opt/app/rules")));
        assert_eq!(settings.logging.default, "warn");
        assert_eq!(settings.logging.modules["rulewatch::watcher"], "debug");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        // Only specify a few settings
        let toml_content = r#"
[watch]
root = "/srv/rules"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified values
        assert_eq!(settings.watch.root, Some(PathBuf::from("/srv/rules")));

        // Default values should still be present
        assert!(settings.watch.recursive);
        assert_eq!(settings.watch.tick_interval_ms, 5000);
        assert!(settings.rules.bundled_dir.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();

        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.watch.drain_timeout_ms, 1000);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(".rulewatch/settings.toml");

        let mut settings = Settings::default();
        settings.watch.root = Some(PathBuf::from("/srv/rules"));
        settings.watch.tick_interval_ms = 3000;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watch.root, Some(PathBuf::from("/srv/rules")));
        assert_eq!(loaded.watch.tick_interval_ms, 3000);
    }

    #[test]
    fn test_validate_rejects_slow_drain() {
        let config = WatchConfig {
            drain_timeout_ms: 5000,
            ..WatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WatchError::ConfigError { .. })
        ));

        let config = WatchConfig {
            tick_interval_ms: 0,
            drain_timeout_ms: 0,
            ..WatchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
