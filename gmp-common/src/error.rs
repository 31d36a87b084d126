//! Common error types for GMP
//!
//! Only bootstrap concerns (config file I/O and parsing) fail in this crate.

use thiserror::Error;

/// Common result type for GMP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across GMP crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error (wraps toml::de::Error)
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
