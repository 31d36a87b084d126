//! Error types for gmp-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Every failure here is session-scoped; none is process-fatal.

use gmp_common::TenantId;
use thiserror::Error;

/// Main error type for gmp-ap module
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid request from a user (empty query, no channel available, bad seek)
    ///
    /// Surfaced synchronously; the session state is left untouched.
    #[error("Invalid request: {0}")]
    UserInput(String),

    /// Command needs a current track but the tenant has none
    #[error("No active session for tenant {0}")]
    NoActiveSession(TenantId),

    /// Pause requested while nothing is playing
    #[error("Nothing is playing")]
    NotPlaying,

    /// Channel id not among the tenant's joinable channels
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Request conflicts with a session that is using the connection
    #[error("Session for tenant {0} is busy on another channel")]
    SessionBusy(TenantId),

    /// Resume requested while playback is not paused
    #[error("Playback is not paused")]
    NotPaused,

    /// Every strategy and every retry failed for one track
    #[error("Resolution failed for '{title}' after {attempts} attempt(s): {reason}")]
    ResolutionFailed {
        title: String,
        attempts: u32,
        reason: String,
    },

    /// Transport join/connection errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Search provider errors
    #[error("Search error: {0}")]
    Search(String),

    /// Work abandoned because its cancellation token fired
    #[error("Cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File/process I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<gmp_common::Error> for Error {
    fn from(e: gmp_common::Error) -> Self {
        match e {
            gmp_common::Error::Io(io) => Error::Io(io),
            gmp_common::Error::Config(msg) => Error::Config(msg),
            gmp_common::Error::Toml(toml) => Error::Config(toml.to_string()),
        }
    }
}

/// Convenience Result type using gmp-ap Error
pub type Result<T> = std::result::Result<T, Error>;
