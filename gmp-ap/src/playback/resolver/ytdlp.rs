//! yt-dlp backed resolver strategies
//!
//! Two methods, tried in this order by the default chain:
//! - `DirectUrlStrategy` asks yt-dlp for the best audio format's media URL
//! - `SegmentedStreamStrategy` lets yt-dlp download the audio itself and
//!   pipes the bytes, which survives formats whose URLs are not directly
//!   playable

use super::{ResolverStrategy, StreamHandle, StreamSource};
use crate::error::{Error, Result};
use crate::ytdlp::YtDlp;
use async_trait::async_trait;
use gmp_common::TrackReference;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStdout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolve to a direct media URL (`yt-dlp -g`)
#[derive(Debug, Clone)]
pub struct DirectUrlStrategy {
    ytdlp: YtDlp,
}

impl DirectUrlStrategy {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }
}

#[async_trait]
impl ResolverStrategy for DirectUrlStrategy {
    fn name(&self) -> &'static str {
        "direct_url"
    }

    async fn resolve(
        &self,
        track: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let url = track.watch_url();
        let stdout = self
            .ytdlp
            .output([
                "-f",
                "bestaudio",
                "-g",
                "--no-playlist",
                "--no-warnings",
                url.as_str(),
            ])
            .await?;

        let media_url = first_media_url(&stdout).ok_or_else(|| {
            Error::Internal(format!("no media URL returned for {}", track.source_id))
        })?;

        debug!(title = %track.title, "Direct media URL obtained");

        Ok(StreamHandle::new(StreamSource::Url(media_url.to_string()), self.name()).for_track(track))
    }
}

/// Pipe yt-dlp's own download (`yt-dlp -o -`)
///
/// Seeks are applied at the source via `--download-sections`, so the byte
/// stream already starts at the requested offset.
#[derive(Debug, Clone)]
pub struct SegmentedStreamStrategy {
    ytdlp: YtDlp,
}

impl SegmentedStreamStrategy {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }

    fn args(track: &TrackReference) -> Vec<String> {
        let mut args: Vec<String> = [
            "-f",
            "bestaudio",
            "-o",
            "-",
            "--quiet",
            "--no-playlist",
            "--no-warnings",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(offset) = track.seek_offset_secs.filter(|o| *o > 0) {
            args.push("--download-sections".to_string());
            args.push(format!("*{}-inf", offset));
        }

        args.push(track.watch_url());
        args
    }
}

#[async_trait]
impl ResolverStrategy for SegmentedStreamStrategy {
    fn name(&self) -> &'static str {
        "segmented_stream"
    }

    async fn resolve(
        &self,
        track: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut child = self
            .ytdlp
            .command(Self::args(track))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("yt-dlp stdout not captured".to_string()))?;
        let mut reader = BufReader::new(stdout);

        // Only hand over a stream that has actually started producing audio
        let buffered = reader.fill_buf().await?.len();
        if buffered == 0 {
            let status = child.wait().await?;
            return Err(Error::Internal(format!(
                "yt-dlp produced no audio for {} ({})",
                track.source_id, status
            )));
        }

        debug!(title = %track.title, buffered, "Segmented stream started");

        let stream = ChildStream {
            _child: child,
            reader,
        };
        Ok(StreamHandle::new(StreamSource::Reader(Box::new(stream)), self.name()).for_track(track))
    }
}

/// Byte stream that owns its producing process
///
/// Dropping it kills the child.
struct ChildStream {
    _child: Child,
    reader: BufReader<ChildStdout>,
}

impl AsyncRead for ChildStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

fn first_media_url(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http://") || line.starts_with("https://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_media_url_skips_noise() {
        let stdout = "WARNING: something\n\nhttps://rr1.example/videoplayback?id=1\nhttps://second\n";
        assert_eq!(
            first_media_url(stdout),
            Some("https://rr1.example/videoplayback?id=1")
        );
        assert_eq!(first_media_url("nothing useful"), None);
    }

    #[test]
    fn test_segmented_args_without_offset() {
        let track = TrackReference::new("Song A", "dQw4w9WgXcQ");
        let args = SegmentedStreamStrategy::args(&track);
        assert!(!args.iter().any(|a| a == "--download-sections"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_segmented_args_with_offset() {
        let mut track = TrackReference::new("Song A", "dQw4w9WgXcQ");
        track.seek_offset_secs = Some(90);
        let args = SegmentedStreamStrategy::args(&track);
        let pos = args.iter().position(|a| a == "--download-sections").unwrap();
        assert_eq!(args[pos + 1], "*90-inf");
    }

    #[tokio::test]
    async fn test_missing_binary_fails_attempt() {
        let strategy = DirectUrlStrategy::new(YtDlp::new("gmp-test-no-such-binary"));
        let track = TrackReference::new("Song A", "dQw4w9WgXcQ");
        assert!(strategy
            .resolve(&track, &CancellationToken::new())
            .await
            .is_err());

        let strategy = SegmentedStreamStrategy::new(YtDlp::new("gmp-test-no-such-binary"));
        assert!(strategy
            .resolve(&track, &CancellationToken::new())
            .await
            .is_err());
    }
}
