//! Configuration management for Procura.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Every wait budget used by the
//! completion-detection engine lives here so it can be tuned per
//! deployment instead of being baked into the code.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/procura/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target site settings
    pub site: SiteConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Completion-detection wait budgets
    pub waits: WaitConfig,
    /// Delays between consecutive page actions
    pub pacing: PacingConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Diagnostic capture settings
    pub diagnostics: DiagnosticsConfig,
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
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            Self::from_toml(&contents)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `PROCURA_BASE_URL`: Override the portal entry URL
    /// - `PROCURA_HEADLESS`: Override browser headless mode (true/false)
    /// - `PROCURA_NETWORK_TIMEOUT_MS`: Override the network wait ceiling
    /// - `PROCURA_LOG_LEVEL`: Override the default log level
    /// - `PROCURA_DEBUG_DIR`: Override the diagnostics output directory
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PROCURA_BASE_URL") {
            tracing::debug!("Override site.base_url from env: {}", url);
            self.site.base_url = url;
        }

        if let Some(headless) = lookup("PROCURA_HEADLESS").and_then(|v| v.parse().ok()) {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        if let Some(ms) = lookup("PROCURA_NETWORK_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.waits.network_timeout_ms = ms;
            tracing::debug!("Override waits.network_timeout_ms from env: {}", ms);
        }

        if let Some(level) = lookup("PROCURA_LOG_LEVEL") {
            tracing::debug!("Override logging.level from env: {}", level);
            self.logging.level = level;
        }

        if let Some(dir) = lookup("PROCURA_DEBUG_DIR") {
            tracing::debug!("Override diagnostics.output_dir from env: {}", dir);
            self.diagnostics.output_dir = PathBuf::from(dir);
        }
    }

    /// Reject values that would make the wait engine hang or spin.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.site.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "site.base_url".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        if self.waits.network_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "waits.network_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.waits.idle_quiet_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "waits.idle_quiet_ms".to_string(),
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
    /// Uses XDG base directories: `~/.config/procura/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "procura", "procura").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Target site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Entry URL of the public search portal
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url:
                "https://prod2.seace.gob.pe/seacebus-uiwd-pub/buscadorPublico/buscadorPublico.xhtml"
                    .to_string(),
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
    /// Navigation timeout in milliseconds
    pub page_load_timeout_ms: u64,
    /// How long to wait for an element to become visible, in milliseconds
    pub element_wait_timeout_ms: u64,
}

impl BrowserConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    /// Element visibility timeout as a `Duration`.
    #[must_use]
    pub fn element_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.element_wait_timeout_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            page_load_timeout_ms: 30_000,
            element_wait_timeout_ms: 10_000,
        }
    }
}

/// Wait budgets for the completion-detection engine, in milliseconds.
///
/// `network_timeout_ms` is the overall ceiling; every other budget is
/// clamped to it when used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Ceiling for observing the exchange triggered by an action
    pub network_timeout_ms: u64,
    /// Cap for the network-idle fallback when no exchange matched
    pub fallback_idle_ms: u64,
    /// Network-idle wait after the primary signal
    pub settle_idle_ms: u64,
    /// Fixed delay after the idle wait, for DOM updates that trail the response
    pub settle_delay_ms: u64,
    /// Extra wait before re-querying rows when the container looks empty
    pub empty_retry_delay_ms: u64,
    /// Quiet window that counts as "network idle"
    pub idle_quiet_ms: u64,
    /// Grace period before closing a diagnostic capture window
    pub capture_grace_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            network_timeout_ms: 30_000,
            fallback_idle_ms: 15_000,
            settle_idle_ms: 5_000,
            settle_delay_ms: 2_000,
            empty_retry_delay_ms: 2_000,
            idle_quiet_ms: 500,
            capture_grace_ms: 1_000,
        }
    }
}

/// Pacing between consecutive actions against the remote site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay between result pages in milliseconds
    pub delay_between_pages_ms: u64,
    /// Delay between document rows in milliseconds
    pub delay_between_documents_ms: u64,
    /// Delay after opening a dropdown or filling a field in milliseconds
    pub interaction_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay_between_pages_ms: 2_000,
            delay_between_documents_ms: 500,
            interaction_delay_ms: 500,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    /// Include the module target in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,procura=debug".to_string(),
            with_target: true,
        }
    }
}

/// Diagnostic capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Use the diagnostic wait policy for every job
    pub enabled: bool,
    /// Directory for network analyses and HTML dumps
    pub output_dir: PathBuf,
    /// Keep static assets (css, js, images, fonts) in network analyses
    pub include_static: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("debug"),
            include_static: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.site.base_url.contains("buscadorPublico.xhtml"));
        assert!(config.browser.headless);
        assert_eq!(config.waits.network_timeout_ms, 30_000);
        assert_eq!(config.waits.fallback_idle_ms, 15_000);
        assert!(!config.diagnostics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[site]"));
        assert!(toml_str.contains("[waits]"));
        assert!(toml_str.contains("[diagnostics]"));
        assert!(!toml_str.contains("[output]"));

        let parsed = AppConfig::from_toml(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.waits.settle_delay_ms, config.waits.settle_delay_ms);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.browser.headless = false;
        config.waits.network_timeout_ms = 45_000;

        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded_contents = fs::read_to_string(&config_path).expect("read config file");
        let loaded = AppConfig::from_toml(&loaded_contents).expect("parse loaded config");

        assert!(!loaded.browser.headless);
        assert_eq!(loaded.waits.network_timeout_ms, 45_000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PROCURA_HEADLESS", "false"),
            ("PROCURA_NETWORK_TIMEOUT_MS", "60000"),
            ("PROCURA_DEBUG_DIR", "/tmp/procura-debug"),
            ("PROCURA_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert!(!config.browser.headless);
        assert_eq!(config.waits.network_timeout_ms, 60_000);
        assert_eq!(config.diagnostics.output_dir, PathBuf::from("/tmp/procura-debug"));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_env_override_ignores_unparseable_values() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| {
            (key == "PROCURA_NETWORK_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert_eq!(config.waits.network_timeout_ms, 30_000);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[waits]
settle_delay_ms = 250

[diagnostics]
enabled = true
"#;

        let config = AppConfig::from_toml(toml_str).expect("parse partial config");
        assert_eq!(config.waits.settle_delay_ms, 250);
        assert!(config.diagnostics.enabled);
        // These should be defaults
        assert_eq!(config.waits.network_timeout_ms, 30_000);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_legacy_output_section_is_ignored() {
        let toml_str = r#"
[output]
data_dir = "data"

[diagnostics]
output_dir = "/tmp/procura-debug"
"#;

        let config = AppConfig::from_toml(toml_str).expect("parse config with output section");
        assert_eq!(config.diagnostics.output_dir, PathBuf::from("/tmp/procura-debug"));
    }

    #[test]
    fn test_zero_network_timeout_rejected() {
        let toml_str = r#"
[waits]
network_timeout_ms = 0
"#;
        let err = AppConfig::from_toml(toml_str).expect_err("zero timeout must be rejected");
        assert!(err.to_string().contains("waits.network_timeout_ms"));
    }

    #[test]
    fn test_duration_helpers() {
        let config = BrowserConfig::default();
        assert_eq!(config.page_load_timeout(), Duration::from_secs(30));
        assert_eq!(config.element_wait_timeout(), Duration::from_secs(10));
    }
}
