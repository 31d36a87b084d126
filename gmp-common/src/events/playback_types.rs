//! Playback-related type definitions
//!
//! Supporting types for the per-session playback state machine.

use serde::{Deserialize, Serialize};

/// Playback session state
///
/// `Idle` is both the initial state and the "nothing happening" state;
/// there is no separate terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No track, no pending work
    #[default]
    Idle,
    /// Waiting for the transport to join a channel
    Connecting,
    /// Turning the current track into a playable stream
    Resolving,
    /// Stream handed to the transport
    Playing,
    /// Transport paused on the current track
    Paused,
    /// Transient failure state; the session recovers on its own
    Error,
}

impl PlaybackState {
    /// States in which the session has a current track
    pub fn has_current_track(self) -> bool {
        matches!(
            self,
            PlaybackState::Resolving | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Connecting => write!(f, "connecting"),
            PlaybackState::Resolving => write!(f, "resolving"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Error => write!(f, "error"),
        }
    }
}

/// Category of a session-scoped failure reported via `SessionError`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// Joining the channel failed (after the single reconnection attempt)
    JoinFailed,
    /// An established connection went away
    ConnectionLost,
    /// The transport reported a playback error for the current track
    PlayerError,
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionErrorKind::JoinFailed => write!(f, "join_failed"),
            SessionErrorKind::ConnectionLost => write!(f, "connection_lost"),
            SessionErrorKind::PlayerError => write!(f, "player_error"),
        }
    }
}
