//! TOML-based configuration for the provider.
//!
//! The file holds both the provider's own settings and the desired device
//! list.  Default location:
//! - Linux:    `~/.config/nelm/provider.toml`
//! - macOS:    `~/Library/Application Support/NELM/provider.toml`
//! - Windows:  `%APPDATA%\NELM\provider.toml`
//!
//! ```toml
//! [provider]
//! app_id = "org.nelm.provider"
//! scheme = "netconf"
//! log_level = "info"
//!
//! [scheduler]
//! initial_delay_secs = 3
//! period_secs = 30
//!
//! [pools]
//! event_workers = 5
//! connection_workers = 10
//!
//! [probe]
//! timeout_ms = 2000
//!
//! [[devices]]
//! address = "10.0.0.1"
//! port = 830
//! username = "admin"
//! password = "admin"
//! ```
//!
//! Every field has a default, so a partial file (or no file at all) is valid.
//! [`TomlConfigSource`] re-reads the file on every call, which is what lets
//! the file watcher's change events take effect.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use nelm_core::DesiredDevice;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::collaborators::{ConfigReadError, ConfigSource};
use crate::application::provider::ProviderSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file could not be watched for changes.
    #[error("failed to watch config: {0}")]
    Watch(#[from] notify::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub pools: PoolSection,
    #[serde(default)]
    pub probe: ProbeSection,
    /// Desired device list.
    #[serde(default)]
    pub devices: Vec<DesiredDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSection {
    /// Configuration key the desired device list belongs to.
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Protocol scheme of every managed device.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSection {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSection {
    #[serde(default = "default_event_workers")]
    pub event_workers: usize,
    #[serde(default = "default_connection_workers")]
    pub connection_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_app_id() -> String {
    "org.nelm.provider".to_string()
}
fn default_scheme() -> String {
    "netconf".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_initial_delay_secs() -> u64 {
    3
}
fn default_period_secs() -> u64 {
    30
}
fn default_event_workers() -> usize {
    5
}
fn default_connection_workers() -> usize {
    10
}
fn default_timeout_ms() -> u64 {
    2000
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            scheme: default_scheme(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            period_secs: default_period_secs(),
        }
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            event_workers: default_event_workers(),
            connection_workers: default_connection_workers(),
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl From<&AppConfig> for ProviderSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            app_id: cfg.provider.app_id.clone(),
            scheme: cfg.provider.scheme.clone(),
            initial_delay: Duration::from_secs(cfg.scheduler.initial_delay_secs),
            period: Duration::from_secs(cfg.scheduler.period_secs.max(1)),
            event_workers: cfg.pools.event_workers,
            connection_workers: cfg.pools.connection_workers,
            probe_timeout: Duration::from_millis(cfg.probe.timeout_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("provider.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("NELM"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("NELM")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("nelm"))
    }
}

// ── Desired device source ─────────────────────────────────────────────────────

/// Serves the `[[devices]]` list of a configuration file.
pub struct TomlConfigSource {
    path: PathBuf,
}

impl TomlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for TomlConfigSource {
    async fn desired_devices(&self, app_id: &str) -> Result<Vec<DesiredDevice>, ConfigReadError> {
        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || load_config(&path))
            .await
            .map_err(|e| ConfigReadError::Unavailable(e.to_string()))?;

        let cfg = loaded.map_err(|e| ConfigReadError::Malformed(e.to_string()))?;
        if cfg.provider.app_id != app_id {
            return Err(ConfigReadError::Unavailable(app_id.to_string()));
        }
        Ok(cfg.devices)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
