//! Audio source resolution
//!
//! **Responsibilities:**
//! - `StreamHandle`: opaque, single-use playable source handed to the transport
//! - `ResolverStrategy`: one way of turning a `TrackReference` into a `StreamHandle`
//! - `AudioSourceResolver`: ordered strategy chain with a per-strategy timeout
//!
//! One call to [`AudioSourceResolver::resolve`] is one *attempt*: strategies
//! are tried in declaration order and the first success wins. If every
//! strategy fails the attempt fails as a whole. Retrying across attempts is
//! the session's job, not the resolver's.
//!
//! Results are never cached. Source URLs expire, so every call re-resolves.

pub mod ytdlp;

pub use ytdlp::{DirectUrlStrategy, SegmentedStreamStrategy};

use crate::error::Result;
use async_trait::async_trait;
use gmp_common::TrackReference;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Playable payload of a `StreamHandle`
pub enum StreamSource {
    /// Direct media URL (short-lived)
    Url(String),
    /// Byte stream, typically piped from a child process
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            StreamSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Opaque handle to a playable audio source
///
/// Not `Clone`: a handle is consumed exactly once by `VoiceConnection::play`.
/// Dropping an unused handle releases whatever produces the stream.
#[derive(Debug)]
pub struct StreamHandle {
    source: StreamSource,
    strategy: &'static str,
    seek_offset_secs: u64,
    duration_secs: Option<u64>,
}

impl StreamHandle {
    pub fn new(source: StreamSource, strategy: &'static str) -> Self {
        Self {
            source,
            strategy,
            seek_offset_secs: 0,
            duration_secs: None,
        }
    }

    /// Copy timing information (seek offset, duration) from the track
    pub fn for_track(mut self, track: &TrackReference) -> Self {
        self.seek_offset_secs = track.seek_offset_secs.unwrap_or(0);
        self.duration_secs = track.duration_secs;
        self
    }

    /// Name of the strategy that produced this handle
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    /// Offset the stream starts at (already applied for byte streams)
    pub fn seek_offset_secs(&self) -> u64 {
        self.seek_offset_secs
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.duration_secs
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    /// Consume the handle, yielding the playable source
    pub fn into_source(self) -> StreamSource {
        self.source
    }
}

/// One extraction method
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    /// Strategy identifier for logs and failure reports
    fn name(&self) -> &'static str;

    /// Produce a playable source for `track`
    ///
    /// Long-running strategies should check `cancel` between steps; the
    /// resolver also drops the future as soon as the token fires.
    async fn resolve(
        &self,
        track: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle>;
}

/// One strategy's failure within an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub reason: String,
}

/// Outcome of a failed resolution attempt
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The cancellation token fired; no further work was done
    #[error("resolution cancelled")]
    Cancelled,

    /// Every strategy failed for this attempt
    #[error("all strategies failed ({})", summarize(.0))]
    Exhausted(Vec<StrategyFailure>),

    /// The resolver has nothing to try
    #[error("no resolver strategies configured")]
    NoStrategies,
}

fn summarize(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.strategy, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ordered strategy chain
#[derive(Clone)]
pub struct AudioSourceResolver {
    strategies: Vec<Arc<dyn ResolverStrategy>>,
    attempt_timeout: Duration,
}

impl AudioSourceResolver {
    /// Create a resolver trying `strategies` in order, each bounded by `attempt_timeout`
    pub fn new(strategies: Vec<Arc<dyn ResolverStrategy>>, attempt_timeout: Duration) -> Self {
        Self {
            strategies,
            attempt_timeout,
        }
    }

    /// Strategy names in the order they are tried
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run one resolution attempt
    ///
    /// Returns promptly with `ResolveError::Cancelled` once `cancel` fires,
    /// including when a strategy has already succeeded: a handle is never
    /// returned past cancellation.
    pub async fn resolve(
        &self,
        track: &TrackReference,
        cancel: &CancellationToken,
    ) -> std::result::Result<StreamHandle, ResolveError> {
        if self.strategies.is_empty() {
            return Err(ResolveError::NoStrategies);
        }

        let mut failures = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            debug!(
                strategy = strategy.name(),
                title = %track.title,
                source_id = %track.source_id,
                "Trying resolver strategy"
            );

            let attempt = tokio::time::timeout(self.attempt_timeout, strategy.resolve(track, cancel));

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                outcome = attempt => outcome,
            };

            match outcome {
                Ok(Ok(handle)) => {
                    if cancel.is_cancelled() {
                        return Err(ResolveError::Cancelled);
                    }
                    debug!(strategy = strategy.name(), title = %track.title, "Resolved");
                    return Ok(handle);
                }
                Ok(Err(e)) => {
                    warn!(strategy = strategy.name(), title = %track.title, "Strategy failed: {}", e);
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        strategy = strategy.name(),
                        title = %track.title,
                        timeout_ms = self.attempt_timeout.as_millis() as u64,
                        "Strategy timed out"
                    );
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        reason: format!("timed out after {:?}", self.attempt_timeout),
                    });
                }
            }
        }

        Err(ResolveError::Exhausted(failures))
    }
}
