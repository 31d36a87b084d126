//! Audio transport contract
//!
//! The transport owns voice connections. Sessions keep only a `Weak`
//! reference and learn about asynchronous events (track ended, player error,
//! connection lost) through the `TransportSignal` channel they pass to
//! [`Transport::join`].

pub mod null_sink;

pub use null_sink::NullSinkTransport;

use crate::error::Result;
use crate::playback::resolver::StreamHandle;
use async_trait::async_trait;
use gmp_common::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A joinable audio channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// What happened on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// The stream started by `play` ran to its end
    TrackEnded,
    /// The player failed while streaming
    PlayerError(String),
    /// The connection itself went away
    Disconnected(String),
}

/// Asynchronous callback from a connection
///
/// `playback_id` echoes the id given to [`VoiceConnection::play`], so the
/// receiver can discard signals that belong to a stream it already replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub playback_id: u64,
    pub kind: SignalKind,
}

pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;

/// An established connection to one channel
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel(&self) -> &ChannelRef;

    /// Start streaming, replacing whatever was playing
    async fn play(&self, stream: StreamHandle, playback_id: u64) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Stop the current stream without emitting `TrackEnded`
    async fn stop(&self) -> Result<()>;
}

/// Connection owner
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join `channel` for `tenant`
    ///
    /// Joining the channel the tenant is already connected to returns the
    /// existing connection (signals are redirected to `signals`); joining a
    /// different channel replaces the old connection.
    async fn join(
        &self,
        tenant: &TenantId,
        channel: &ChannelRef,
        signals: SignalSender,
    ) -> Result<Arc<dyn VoiceConnection>>;

    /// Channel the tenant is currently connected to, if any
    async fn current_channel(&self, tenant: &TenantId) -> Option<ChannelRef>;

    /// Channels the tenant could join
    async fn channels(&self, tenant: &TenantId) -> Result<Vec<ChannelRef>>;

    /// Stop and drop the tenant's connection; no-op when there is none
    async fn release(&self, tenant: &TenantId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_display() {
        assert_eq!(ChannelRef::new("123").to_string(), "123");
        assert_eq!(ChannelRef::named("123", "Lounge").to_string(), "Lounge (123)");
    }

    #[test]
    fn test_channel_deserializes_without_name() {
        let channel: ChannelRef = serde_json::from_str(r#"{"id":"42"}"#).unwrap();
        assert_eq!(channel, ChannelRef::new("42"));
    }
}
