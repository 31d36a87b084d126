//! Configuration loading
//!
//! GMP reads a single TOML bootstrap file. The file path is resolved in
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. `GMP_CONFIG` environment variable
//! 3. User config directory (`~/.config/gmp/config.toml` on Linux)
//! 4. System config (`/etc/gmp/config.toml`, Linux only)
//! 5. Compiled defaults (fallback)
//!
//! A missing file is never fatal: the resolver logs a warning and every
//! field falls back to its built-in default.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "GMP_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Playback orchestration tuning
    pub playback: PlaybackConfig,

    /// yt-dlp invocation settings
    pub ytdlp: YtDlpConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 5760,
            bind_address: "0.0.0.0".to_string(),
            logging: LoggingConfig::default(),
            playback: PlaybackConfig::default(),
            ytdlp: YtDlpConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Playback orchestration settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Resolution attempts per track before it is abandoned
    pub max_resolve_attempts: u32,

    /// Linear backoff unit between attempts (attempt_index * base)
    pub retry_base_delay_ms: u64,

    /// Upper bound for one resolver strategy call
    pub resolve_attempt_timeout_ms: u64,

    /// Upper bound for one transport join
    pub join_timeout_ms: u64,

    /// Delay before advancing after a transport/player error
    pub advance_delay_ms: u64,

    /// Event bus buffer size
    pub event_bus_capacity: usize,

    /// Per-session command channel size
    pub command_buffer: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_resolve_attempts: 3,
            retry_base_delay_ms: 1000,
            resolve_attempt_timeout_ms: 20_000,
            join_timeout_ms: 10_000,
            advance_delay_ms: 1000,
            event_bus_capacity: 1000,
            command_buffer: 64,
        }
    }
}

/// yt-dlp settings shared by the resolver strategies and the search provider
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct YtDlpConfig {
    /// Executable name or path
    pub binary: String,

    /// Search results per page
    pub search_results_per_page: u32,

    /// Search attempts before giving up
    pub search_max_retries: u32,

    /// Linear backoff unit between search attempts ((attempt + 1) * base)
    pub search_retry_base_delay_ms: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            search_results_per_page: 10,
            search_max_retries: 3,
            search_retry_base_delay_ms: 1000,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration, falling back to defaults
    ///
    /// An explicitly requested file (CLI or env var) that fails to parse is an
    /// error; a file that simply does not exist only produces a warning.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Configuration file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.playback.max_resolve_attempts == 0 {
            return Err(Error::Config(
                "playback.max_resolve_attempts must be at least 1".to_string(),
            ));
        }
        if self.playback.event_bus_capacity == 0 || self.playback.command_buffer == 0 {
            return Err(Error::Config(
                "playback channel capacities must be non-zero".to_string(),
            ));
        }
        if self.ytdlp.search_results_per_page == 0 {
            return Err(Error::Config(
                "ytdlp.search_results_per_page must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the configuration file path by priority order
///
/// Returns the first candidate that was explicitly requested or that exists
/// on disk; `None` when nothing applies.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("gmp").join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/gmp/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
