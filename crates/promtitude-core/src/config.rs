//! Configuration management for the importer.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/promtitude/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage location settings
    pub storage: StorageConfig,
    /// Import rate limits
    pub rate_limits: RateLimitConfig,
    /// Background processor pacing and timeouts
    pub processor: ProcessorConfig,
    /// Contact panel polling during extraction
    pub extraction: ExtractionConfig,
    /// Listing re-scan schedule
    pub discovery: DiscoveryConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Remote candidate API settings
    pub api: ApiConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// if the file does not exist.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `PROMTITUDE_API_URL`: Override the candidate API base URL
    /// - `PROMTITUDE_HEADLESS`: Override browser headless mode (true/false)
    /// - `PROMTITUDE_HOURLY_LIMIT`: Override the hourly import limit
    /// - `PROMTITUDE_DAILY_LIMIT`: Override the daily import limit
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("PROMTITUDE_API_URL") {
            tracing::debug!("Override api.base_url from env: {}", val);
            self.api.base_url = val;
        }

        if let Some(val) = lookup("PROMTITUDE_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("PROMTITUDE_HOURLY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.rate_limits.hourly = limit;
                tracing::debug!("Override rate_limits.hourly from env: {}", limit);
            }
        }

        if let Some(val) = lookup("PROMTITUDE_DAILY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.rate_limits.daily = limit;
                tracing::debug!("Override rate_limits.daily from env: {}", limit);
            }
        }
    }

    /// Check values that would make the processor misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rate_limits.hourly == 0 || self.rate_limits.daily == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limits".to_string(),
                reason: "limits must be greater than zero".to_string(),
            });
        }
        if self.rate_limits.hourly > self.rate_limits.daily {
            return Err(ConfigError::InvalidValue {
                field: "rate_limits.hourly".to_string(),
                reason: format!(
                    "hourly limit {} exceeds daily limit {}",
                    self.rate_limits.hourly, self.rate_limits.daily
                ),
            });
        }
        if self.processor.item_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "processor.item_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.extraction.panel_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "extraction.panel_poll_attempts".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/promtitude/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/promtitude`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the queue database path, defaulting to `<data_dir>/queue.db`.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("queue.db")),
        }
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "promtitude", "promtitude").ok_or(ConfigError::NoConfigDir)
}

/// Storage location settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit database path; defaults to the XDG data directory
    pub database_path: Option<PathBuf>,
}

/// Compliance limits on successful imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Successful imports allowed per hourly window
    pub hourly: u32,
    /// Successful imports allowed per daily window
    pub daily: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly: 40,
            daily: 200,
        }
    }
}

/// Background processor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Ceiling for navigate + extract + submit of one item, in seconds
    pub item_timeout_secs: u64,
    /// Pause between items in milliseconds
    pub item_delay_ms: u64,
    /// Random jitter applied to the pause, as a percentage of it
    pub delay_jitter_pct: u8,
}

impl ProcessorConfig {
    /// Per-item timeout as a `Duration`.
    #[must_use]
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    /// Base inter-item delay as a `Duration`.
    #[must_use]
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            item_timeout_secs: 60,
            item_delay_ms: 3000,
            delay_jitter_pct: 20,
        }
    }
}

/// Contact panel polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// How many times to look for the contact panel after opening it
    pub panel_poll_attempts: u32,
    /// Delay between polls in milliseconds
    pub panel_poll_interval_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            panel_poll_attempts: 10,
            panel_poll_interval_ms: 300,
        }
    }
}

/// Listing re-scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Delays after initial load at which the listing is scanned again
    pub rescan_delays_ms: Vec<u64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rescan_delays_ms: vec![1000, 3000, 6000],
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Fixed user agent; a common desktop one is picked per launch when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
            user_agent: None,
        }
    }
}

/// Remote candidate API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the recruiting API
    pub base_url: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.promtitude.com".to_string(),
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limits.hourly, 40);
        assert_eq!(config.rate_limits.daily, 200);
        assert_eq!(config.processor.item_timeout_secs, 60);
        assert_eq!(config.extraction.panel_poll_attempts, 10);
        assert!(config.browser.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[rate_limits]"));
        assert!(toml_str.contains("[processor]"));
        assert!(toml_str.contains("[api]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.api.base_url, config.api.base_url);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.rate_limits.hourly = 10;
        config.processor.item_delay_ms = 500;

        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.rate_limits.hourly, 10);
        assert_eq!(loaded.processor.item_delay_ms, 500);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load config");
        assert_eq!(loaded.rate_limits.daily, 200);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|name| match name {
            "PROMTITUDE_API_URL" => Some("http://localhost:8000".to_string()),
            "PROMTITUDE_HEADLESS" => Some("false".to_string()),
            "PROMTITUDE_HOURLY_LIMIT" => Some("5".to_string()),
            "PROMTITUDE_DAILY_LIMIT" => Some("not-a-number".to_string()),
            _ => None,
        });

        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert!(!config.browser.headless);
        assert_eq!(config.rate_limits.hourly, 5);
        assert_eq!(config.rate_limits.daily, 200);
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let mut config = AppConfig::default();
        config.rate_limits.hourly = 500;
        config.rate_limits.daily = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[rate_limits]
hourly = 20

[processor]
item_timeout_secs = 45
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.rate_limits.hourly, 20);
        assert_eq!(config.processor.item_timeout(), Duration::from_secs(45));
        // These should be defaults
        assert_eq!(config.rate_limits.daily, 200);
        assert_eq!(config.discovery.rescan_delays_ms, vec![1000, 3000, 6000]);
    }

    #[test]
    fn test_explicit_database_path() {
        let mut config = AppConfig::default();
        config.storage.database_path = Some(PathBuf::from("/tmp/queue-test.db"));
        assert_eq!(
            config.database_path().expect("resolve path"),
            PathBuf::from("/tmp/queue-test.db")
        );
    }
}
