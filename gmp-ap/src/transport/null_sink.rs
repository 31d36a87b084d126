//! Headless transport
//!
//! Consumes streams without producing sound: byte streams are read to EOF,
//! URL streams are played against the wall clock for the track's remaining
//! duration. Used by the service binary when no real voice backend is
//! attached, and useful for exercising the orchestrator end to end.

use super::{ChannelRef, SignalKind, SignalSender, Transport, TransportSignal, VoiceConnection};
use crate::error::{Error, Result};
use crate::playback::resolver::{StreamHandle, StreamSource};
use async_trait::async_trait;
use gmp_common::TenantId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Clock length for URL streams whose duration is unknown
const DEFAULT_TRACK_LENGTH: Duration = Duration::from_secs(180);

const READ_CHUNK: usize = 16 * 1024;

/// Transport that plays into the void
pub struct NullSinkTransport {
    channels: Vec<ChannelRef>,
    connections: RwLock<HashMap<TenantId, Arc<NullSinkConnection>>>,
}

impl NullSinkTransport {
    /// Create a transport offering `channels` to every tenant
    ///
    /// Joining a channel outside this list is still accepted.
    pub fn new(channels: Vec<ChannelRef>) -> Self {
        Self {
            channels,
            connections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for NullSinkTransport {
    fn default() -> Self {
        Self::new(vec![ChannelRef::named("default", "Default")])
    }
}

#[async_trait]
impl Transport for NullSinkTransport {
    async fn join(
        &self,
        tenant: &TenantId,
        channel: &ChannelRef,
        signals: SignalSender,
    ) -> Result<Arc<dyn VoiceConnection>> {
        let mut connections = self.connections.write().await;

        if let Some(existing) = connections.get(tenant) {
            if existing.channel.id == channel.id {
                existing.redirect(signals);
                debug!(tenant_id = %tenant, channel = %channel, "Reusing connection");
                return Ok(existing.clone());
            }
            existing.halt();
        }

        info!(tenant_id = %tenant, channel = %channel, "Joined channel");
        let connection = Arc::new(NullSinkConnection::new(channel.clone(), signals));
        connections.insert(tenant.clone(), connection.clone());
        Ok(connection)
    }

    async fn current_channel(&self, tenant: &TenantId) -> Option<ChannelRef> {
        self.connections
            .read()
            .await
            .get(tenant)
            .map(|c| c.channel.clone())
    }

    async fn channels(&self, _tenant: &TenantId) -> Result<Vec<ChannelRef>> {
        Ok(self.channels.clone())
    }

    async fn release(&self, tenant: &TenantId) {
        if let Some(connection) = self.connections.write().await.remove(tenant) {
            connection.halt();
            info!(tenant_id = %tenant, channel = %connection.channel, "Released connection");
        }
    }
}

/// Playback currently owned by a connection
struct ActivePlayback {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

/// One tenant's headless connection
pub struct NullSinkConnection {
    channel: ChannelRef,
    signals: Arc<Mutex<SignalSender>>,
    active: Mutex<Option<ActivePlayback>>,
}

impl NullSinkConnection {
    fn new(channel: ChannelRef, signals: SignalSender) -> Self {
        Self {
            channel,
            signals: Arc::new(Mutex::new(signals)),
            active: Mutex::new(None),
        }
    }

    fn redirect(&self, signals: SignalSender) {
        if let Ok(mut current) = self.signals.lock() {
            *current = signals;
        }
    }

    /// Cancel the running stream, if any
    fn halt(&self) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(playback) = active.take() {
                playback.cancel.cancel();
            }
        }
    }

    fn set_paused(&self, value: bool) -> Result<()> {
        let active = self
            .active
            .lock()
            .map_err(|_| Error::Internal("connection state poisoned".to_string()))?;
        match active.as_ref() {
            Some(playback) => {
                playback.paused.send_replace(value);
                Ok(())
            }
            None => Err(Error::Transport("nothing is streaming".to_string())),
        }
    }
}

#[async_trait]
impl VoiceConnection for NullSinkConnection {
    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    async fn play(&self, stream: StreamHandle, playback_id: u64) -> Result<()> {
        let remaining = stream
            .duration_secs()
            .map(|d| Duration::from_secs(d.saturating_sub(stream.seek_offset_secs())))
            .unwrap_or(DEFAULT_TRACK_LENGTH);
        let strategy = stream.strategy();

        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);

        {
            let mut active = self
                .active
                .lock()
                .map_err(|_| Error::Internal("connection state poisoned".to_string()))?;
            if let Some(previous) = active.take() {
                previous.cancel.cancel();
            }
            *active = Some(ActivePlayback {
                cancel: cancel.clone(),
                paused: paused_tx,
            });
        }

        debug!(channel = %self.channel, playback_id, strategy, "Streaming to null sink");

        let signals = self.signals.clone();
        tokio::spawn(async move {
            let outcome = match stream.into_source() {
                StreamSource::Reader(reader) => drain(reader, paused_rx, &cancel).await,
                StreamSource::Url(_) => run_clock(remaining, paused_rx, &cancel).await,
            };

            let kind = match outcome {
                Outcome::Ended => SignalKind::TrackEnded,
                Outcome::Failed(reason) => SignalKind::PlayerError(reason),
                Outcome::Stopped => return,
            };

            let sender = match signals.lock() {
                Ok(sender) => sender.clone(),
                Err(_) => return,
            };
            if sender.send(TransportSignal { playback_id, kind }).is_err() {
                warn!(playback_id, "No listener for transport signal");
            }
        });

        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.set_paused(true)
    }

    async fn resume(&self) -> Result<()> {
        self.set_paused(false)
    }

    async fn stop(&self) -> Result<()> {
        self.halt();
        Ok(())
    }
}

enum Outcome {
    Ended,
    Stopped,
    Failed(String),
}

/// Wait while paused; `false` when cancelled or the pause sender is gone
async fn wait_unpaused(paused: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
    while *paused.borrow() {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = paused.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
    true
}

async fn drain(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    mut paused: watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> Outcome {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        if !wait_unpaused(&mut paused, cancel).await {
            return Outcome::Stopped;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Outcome::Stopped,
            changed = paused.changed() => {
                if changed.is_err() {
                    return Outcome::Stopped;
                }
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Outcome::Ended,
                Ok(_) => {}
                Err(e) => return Outcome::Failed(e.to_string()),
            },
        }
    }
}

async fn run_clock(
    mut remaining: Duration,
    mut paused: watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> Outcome {
    loop {
        if !wait_unpaused(&mut paused, cancel).await {
            return Outcome::Stopped;
        }
        let started = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => return Outcome::Stopped,
            _ = tokio::time::sleep(remaining) => return Outcome::Ended,
            changed = paused.changed() => {
                if changed.is_err() {
                    return Outcome::Stopped;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmp_common::TrackReference;
    use tokio::sync::mpsc;

    fn url_handle(duration_secs: u64) -> StreamHandle {
        StreamHandle::new(StreamSource::Url("https://cdn.example/a".to_string()), "test")
            .for_track(&TrackReference::new("Song A", "abc").with_duration(duration_secs))
    }

    #[tokio::test]
    async fn test_join_is_idempotent_per_channel() {
        let transport = NullSinkTransport::default();
        let tenant = TenantId::from("guild-1");
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = transport.join(&tenant, &ChannelRef::new("a"), tx.clone()).await.unwrap();
        let again = transport.join(&tenant, &ChannelRef::new("a"), tx.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let other = transport.join(&tenant, &ChannelRef::new("b"), tx).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(transport.current_channel(&tenant).await, Some(ChannelRef::new("b")));
    }

    #[tokio::test]
    async fn test_release_drops_connection() {
        let transport = NullSinkTransport::default();
        let tenant = TenantId::from("guild-1");
        let (tx, _rx) = mpsc::unbounded_channel();

        let connection = transport.join(&tenant, &ChannelRef::new("a"), tx).await.unwrap();
        let weak = Arc::downgrade(&connection);
        drop(connection);

        transport.release(&tenant).await;
        assert!(transport.current_channel(&tenant).await.is_none());
        assert!(weak.upgrade().is_none());

        // Releasing again is a no-op
        transport.release(&tenant).await;
    }

    #[tokio::test]
    async fn test_reader_stream_ends_with_signal() {
        let transport = NullSinkTransport::default();
        let tenant = TenantId::from("guild-1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = transport.join(&tenant, &ChannelRef::new("a"), tx).await.unwrap();

        let bytes: &'static [u8] = b"not really audio";
        let handle = StreamHandle::new(StreamSource::Reader(Box::new(bytes)), "test");
        connection.play(handle, 7).await.unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            signal,
            TransportSignal {
                playback_id: 7,
                kind: SignalKind::TrackEnded
            }
        );
    }

    #[tokio::test]
    async fn test_stop_suppresses_track_ended() {
        let transport = NullSinkTransport::default();
        let tenant = TenantId::from("guild-1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = transport.join(&tenant, &ChannelRef::new("a"), tx).await.unwrap();

        connection.play(url_handle(1), 1).await.unwrap();
        connection.stop().await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
        assert!(received.is_err(), "stopped stream must not signal");
    }

    #[tokio::test]
    async fn test_pause_requires_active_stream() {
        let transport = NullSinkTransport::default();
        let tenant = TenantId::from("guild-1");
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = transport.join(&tenant, &ChannelRef::new("a"), tx).await.unwrap();

        assert!(connection.pause().await.is_err());

        connection.play(url_handle(60), 1).await.unwrap();
        connection.pause().await.unwrap();
        connection.resume().await.unwrap();
    }
}
