//! gmp-ap runtime settings
//!
//! `PlayerSettings` is the orchestrator's view of the `[playback]` section of
//! the bootstrap TOML, converted to durations once at startup.

use gmp_common::config::{PlaybackConfig, TomlConfig};
use std::time::Duration;

/// Settings consumed by sessions and the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    /// Resolution attempts per track before the track is abandoned
    pub max_resolve_attempts: u32,

    /// Backoff unit; attempt `n` (0-based) waits `n * retry_base_delay`
    pub retry_base_delay: Duration,

    /// Bound for one strategy call
    pub resolve_attempt_timeout: Duration,

    /// Bound for one transport join
    pub join_timeout: Duration,

    /// Pause before advancing after a transport/player error
    pub advance_delay: Duration,

    /// Per-session command channel size
    pub command_buffer: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for PlayerSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            max_resolve_attempts: config.max_resolve_attempts.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            resolve_attempt_timeout: Duration::from_millis(config.resolve_attempt_timeout_ms),
            join_timeout: Duration::from_millis(config.join_timeout_ms),
            advance_delay: Duration::from_millis(config.advance_delay_ms),
            command_buffer: config.command_buffer.max(1),
        }
    }
}

impl From<&TomlConfig> for PlayerSettings {
    fn from(config: &TomlConfig) -> Self {
        Self::from(&config.playback)
    }
}

impl PlayerSettings {
    /// Backoff before retry number `attempt_index` (0 = first attempt, no wait)
    pub fn retry_delay(&self, attempt_index: u32) -> Duration {
        self.retry_base_delay * attempt_index
    }
}
