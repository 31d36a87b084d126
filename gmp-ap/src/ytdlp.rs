//! yt-dlp process invocation
//!
//! Shared by the resolver strategies and the search provider. Every child is
//! spawned with `kill_on_drop`, so dropping the future (cancellation or
//! timeout) terminates the process.

use crate::error::{Error, Result};
use gmp_common::config::YtDlpConfig;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Handle to the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &YtDlpConfig) -> Self {
        Self::new(config.binary.clone())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Base command: no stdin, killed when dropped
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run to completion and return stdout
    ///
    /// A non-zero exit status is an error carrying the last stderr line.
    pub async fn output<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(binary = %self.binary, "Running yt-dlp");

        let output = cmd.output().await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to run {}: {}", self.binary, e),
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output");
            return Err(Error::Internal(format!(
                "{} exited with {}: {}",
                self.binary, output.status, detail
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let ytdlp = YtDlp::new("gmp-test-no-such-binary");
        let err = ytdlp.output(["--version"]).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_config_uses_binary() {
        let config = YtDlpConfig {
            binary: "/opt/bin/yt-dlp".to_string(),
            ..YtDlpConfig::default()
        };
        assert_eq!(YtDlp::from_config(&config).binary(), "/opt/bin/yt-dlp");
    }
}
