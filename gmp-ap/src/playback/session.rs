//! Per-session playback state machine
//!
//! **Responsibilities:**
//! - Own one tenant's queue, current track and playback state
//! - Drive the transport join, the resolver and the transport connection
//! - Publish exactly one `SessionStateChanged` per state transition
//!
//! **Concurrency model:** each session is an actor. Commands from callers,
//! transport signals, join/resolution outcomes and advance timers all arrive
//! on channels consumed by a single task, so nothing mutates a session
//! concurrently. Slow work (join, resolution, backoff) runs in spawned tasks
//! that report back by message; every such message carries the `epoch` it
//! was started under, and anything from an older epoch is discarded.
//!
//! **States:** Idle → Connecting → Resolving → Playing ⇄ Paused, plus Error.
//! `current_track` is set exactly in Resolving, Playing and Paused.

use super::publisher::EventPublisher;
use super::queue::TrackQueue;
use super::resolver::{AudioSourceResolver, ResolveError, StreamHandle};
use crate::config::PlayerSettings;
use crate::error::{Error, Result};
use crate::transport::{ChannelRef, SignalKind, Transport, TransportSignal, VoiceConnection};
use chrono::Utc;
use gmp_common::events::SessionErrorKind;
use gmp_common::{GmpEvent, PlaybackState, TenantId, TrackReference};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionDeps {
    pub resolver: Arc<AudioSourceResolver>,
    pub transport: Arc<dyn Transport>,
    pub publisher: Arc<dyn EventPublisher>,
    pub settings: PlayerSettings,
}

/// Map a session unregisters itself from
pub(crate) type SessionMap = RwLock<HashMap<TenantId, SessionHandle>>;

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub current_track: Option<TrackReference>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub queue: Vec<TrackReference>,
}

impl SessionSnapshot {
    /// View of a tenant that has no session
    pub fn idle() -> Self {
        Self {
            state: PlaybackState::Idle,
            current_track: None,
            is_playing: false,
            is_paused: false,
            queue: Vec::new(),
        }
    }

    /// State event carrying this snapshot
    pub fn into_event(self, tenant_id: TenantId) -> GmpEvent {
        GmpEvent::SessionStateChanged {
            tenant_id,
            state: self.state,
            current_track: self.current_track,
            is_playing: self.is_playing,
            is_paused: self.is_paused,
            queue: self.queue,
            timestamp: Utc::now(),
        }
    }
}

/// Requests accepted by a session
#[derive(Debug)]
pub enum SessionCommand {
    Enqueue {
        track: TrackReference,
        channel: Option<ChannelRef>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Skip {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    Seek {
        offset_secs: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Cloneable address of a running session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Uuid,
    tenant: TenantId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// `false` once the session's actor has exited
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Send a command and wait for its reply
    ///
    /// Returns `None` when the session shut down before answering.
    pub async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await.ok()?;
        rx.await.ok()
    }
}

/// Spawn a session actor for `tenant`
pub(crate) fn spawn(tenant: TenantId, deps: SessionDeps, registry: Weak<SessionMap>) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(deps.settings.command_buffer);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    let actor = SessionActor {
        id,
        tenant: tenant.clone(),
        deps,
        registry,
        state: PlaybackState::Idle,
        queue: TrackQueue::new(),
        current: None,
        interrupted: None,
        connection: None,
        channel: None,
        join_retries_left: 0,
        rejoining: false,
        join_cancel: None,
        join_task: None,
        resolve_cancel: None,
        attempts: 0,
        pending_after: None,
        epoch: 0,
        next_playback_id: 0,
        playing_id: None,
        commands: cmd_rx,
        internal_tx,
        internal_rx,
        signal_tx,
        signal_rx,
    };

    debug!(tenant_id = %tenant, session_id = %id, "Session created");
    tokio::spawn(actor.run());

    SessionHandle {
        id,
        tenant,
        commands: cmd_tx,
    }
}

/// Results of background work, reported back to the actor
enum Internal {
    Joined {
        epoch: u64,
        channel: ChannelRef,
        result: Result<Arc<dyn VoiceConnection>>,
    },
    Resolved {
        epoch: u64,
        result: std::result::Result<StreamHandle, ResolveError>,
    },
    AdvanceDue {
        epoch: u64,
        action: AfterError,
    },
}

/// What to do once the post-error delay has elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterError {
    /// Continue with the next queued track
    NextTrack,
    /// Drop the queue and go idle (no connection to play on)
    Reset,
}

struct SessionActor {
    id: Uuid,
    tenant: TenantId,
    deps: SessionDeps,
    registry: Weak<SessionMap>,

    state: PlaybackState,
    queue: TrackQueue,
    current: Option<TrackReference>,
    /// Track cut off by a lost connection, resumed after re-joining
    interrupted: Option<TrackReference>,

    connection: Option<Weak<dyn VoiceConnection>>,
    channel: Option<ChannelRef>,
    join_retries_left: u8,
    rejoining: bool,
    /// Fired by `stop`; a join that completes afterwards releases itself
    join_cancel: Option<CancellationToken>,
    join_task: Option<JoinHandle<()>>,

    resolve_cancel: Option<CancellationToken>,
    /// Resolution attempts started for the current track
    attempts: u32,
    /// Follow-up scheduled while in Error
    pending_after: Option<AfterError>,

    epoch: u64,
    next_playback_id: u64,
    playing_id: Option<u64>,

    commands: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    signal_rx: mpsc::UnboundedReceiver<TransportSignal>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(message) = self.internal_rx.recv() => self.handle_internal(message).await,
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal).await,
            }

            if self.is_finished() && self.try_unregister().await {
                break;
            }
        }

        self.shutdown().await;
    }

    fn is_finished(&self) -> bool {
        self.state == PlaybackState::Idle && self.queue.is_empty()
    }

    /// Remove this session from the registry if no command is waiting
    ///
    /// Runs under the registry write lock, so no new handle can be handed
    /// out while the decision is made.
    async fn try_unregister(&mut self) -> bool {
        let Some(map) = self.registry.upgrade() else {
            return true;
        };
        let mut sessions = map.write().await;

        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    drop(sessions);
                    self.handle_command(command).await;
                    if !self.is_finished() {
                        return false;
                    }
                    sessions = map.write().await;
                }
                Err(_) => break,
            }
        }

        if sessions.get(&self.tenant).map(|h| h.id) == Some(self.id) {
            sessions.remove(&self.tenant);
        }
        true
    }

    async fn shutdown(&mut self) {
        self.cancel_resolution();
        if let Some(cancel) = self.join_cancel.take() {
            cancel.cancel();
        }
        if self.playing_id.take().is_some() {
            if let Some(connection) = self.live_connection() {
                if let Err(e) = connection.stop().await {
                    warn!(tenant_id = %self.tenant, "Failed to stop playback on shutdown: {}", e);
                }
            }
        }
        info!(tenant_id = %self.tenant, session_id = %self.id, "Session closed");
        self.deps.publisher.emit(GmpEvent::SessionClosed {
            tenant_id: self.tenant.clone(),
            timestamp: Utc::now(),
        });
    }

    // ========================================
    // Commands
    // ========================================

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Enqueue {
                track,
                channel,
                reply,
            } => {
                let _ = reply.send(self.enqueue(track, channel));
            }
            SessionCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            SessionCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            SessionCommand::Seek { offset_secs, reply } => {
                let _ = reply.send(self.seek(offset_secs).await);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn enqueue(&mut self, track: TrackReference, channel: Option<ChannelRef>) -> Result<usize> {
        if self.pending_after == Some(AfterError::Reset) {
            return Err(Error::Transport(format!(
                "session for {} is resetting after a transport failure",
                self.tenant
            )));
        }

        if self.state != PlaybackState::Idle {
            let position = self.queue.enqueue(track);
            debug!(tenant_id = %self.tenant, position, state = %self.state, "Track queued");
            self.publish_queue();
            return Ok(position);
        }

        if let Some(channel) = channel.or_else(|| self.channel.clone()) {
            self.channel = Some(channel);
        }

        if self.live_connection().is_some() {
            let position = self.queue.enqueue(track);
            self.start_next();
            return Ok(position);
        }

        let Some(channel) = self.channel.clone() else {
            return Err(Error::UserInput(
                "no channel specified and none connected".to_string(),
            ));
        };

        let position = self.queue.enqueue(track);
        self.join_retries_left = 1;
        self.rejoining = false;
        self.transition(PlaybackState::Connecting);
        self.begin_join(channel);
        Ok(position)
    }

    async fn skip(&mut self) -> Result<()> {
        if !self.state.has_current_track() {
            return Err(Error::NoActiveSession(self.tenant.clone()));
        }

        if let Some(track) = &self.current {
            info!(tenant_id = %self.tenant, title = %track.title, "Skipping track");
        }
        self.halt_current().await;
        self.current = None;
        self.start_next();
        Ok(())
    }

    async fn stop(&mut self) {
        self.halt_current().await;
        self.abandon_join().await;
        self.queue.clear();
        self.current = None;
        self.interrupted = None;
        self.connection = None;
        self.deps.transport.release(&self.tenant).await;

        if self.state != PlaybackState::Idle {
            info!(tenant_id = %self.tenant, "Playback stopped");
            self.transition(PlaybackState::Idle);
        }
    }

    async fn pause(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Err(Error::NotPlaying);
        }
        let connection = self
            .live_connection()
            .ok_or_else(|| Error::Transport("connection lost".to_string()))?;
        connection.pause().await?;
        self.transition(PlaybackState::Paused);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        if self.state != PlaybackState::Paused {
            return Err(Error::NotPaused);
        }
        let connection = self
            .live_connection()
            .ok_or_else(|| Error::Transport("connection lost".to_string()))?;
        connection.resume().await?;
        self.transition(PlaybackState::Playing);
        Ok(())
    }

    async fn seek(&mut self, offset_secs: u64) -> Result<()> {
        let Some(mut track) = self.current.clone() else {
            return Err(Error::NoActiveSession(self.tenant.clone()));
        };

        if let Some(duration) = track.duration_secs {
            if offset_secs >= duration {
                return Err(Error::UserInput(format!(
                    "seek position {}s is beyond track length {}s",
                    offset_secs, duration
                )));
            }
        }

        info!(tenant_id = %self.tenant, title = %track.title, offset_secs, "Seeking");
        self.halt_current().await;
        track.seek_offset_secs = Some(offset_secs);
        self.begin_resolving(track);
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            current_track: self.current.clone(),
            is_playing: self.state == PlaybackState::Playing,
            is_paused: self.state == PlaybackState::Paused,
            queue: self.queue.snapshot(),
        }
    }

    // ========================================
    // Background outcomes
    // ========================================

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Joined {
                epoch,
                channel,
                result,
            } => {
                if epoch == self.epoch && self.state == PlaybackState::Connecting {
                    self.join_cancel = None;
                    self.join_task = None;
                    self.on_joined(channel, result);
                }
            }
            Internal::Resolved { epoch, result } => {
                if epoch == self.epoch && self.state == PlaybackState::Resolving {
                    self.on_resolved(result).await;
                }
            }
            Internal::AdvanceDue { epoch, action } => {
                if epoch == self.epoch && self.state == PlaybackState::Error {
                    match action {
                        AfterError::NextTrack => self.start_next(),
                        AfterError::Reset => {
                            self.queue.clear();
                            self.interrupted = None;
                            self.transition(PlaybackState::Idle);
                        }
                    }
                }
            }
        }
    }

    fn on_joined(&mut self, channel: ChannelRef, result: Result<Arc<dyn VoiceConnection>>) {
        match result {
            Ok(connection) => {
                info!(tenant_id = %self.tenant, channel = %channel, "Transport joined");
                self.connection = Some(Arc::downgrade(&connection));
                self.channel = Some(channel);
                self.rejoining = false;

                match self.interrupted.take() {
                    Some(track) => self.begin_resolving(track),
                    None => self.start_next(),
                }
            }
            Err(e) if self.join_retries_left > 0 => {
                self.join_retries_left -= 1;
                warn!(tenant_id = %self.tenant, channel = %channel, "Join failed, retrying: {}", e);
                self.begin_join(channel);
            }
            Err(e) => {
                let kind = if self.rejoining {
                    SessionErrorKind::ConnectionLost
                } else {
                    SessionErrorKind::JoinFailed
                };
                error!(tenant_id = %self.tenant, channel = %channel, "Join failed: {}", e);
                self.rejoining = false;
                self.enter_error(kind, e.to_string(), AfterError::Reset);
            }
        }
    }

    async fn on_resolved(&mut self, result: std::result::Result<StreamHandle, ResolveError>) {
        self.resolve_cancel = None;

        match result {
            Ok(handle) => self.start_playback(handle).await,
            Err(ResolveError::Cancelled) => {}
            Err(e) if self.attempts < self.deps.settings.max_resolve_attempts => {
                warn!(
                    tenant_id = %self.tenant,
                    attempt = self.attempts,
                    max_attempts = self.deps.settings.max_resolve_attempts,
                    "Resolution failed, retrying: {}",
                    e
                );
                self.spawn_attempt();
            }
            Err(e) => {
                let Some(track) = self.current.take() else {
                    return;
                };
                let failure = Error::ResolutionFailed {
                    title: track.title.clone(),
                    attempts: self.attempts,
                    reason: e.to_string(),
                };
                error!(tenant_id = %self.tenant, "{}", failure);
                self.deps.publisher.emit(GmpEvent::ResolutionFailed {
                    tenant_id: self.tenant.clone(),
                    track,
                    attempts: self.attempts,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.start_next();
            }
        }
    }

    async fn start_playback(&mut self, handle: StreamHandle) {
        let Some(connection) = self.live_connection() else {
            drop(handle);
            self.connection_lost("connection dropped before playback".to_string());
            return;
        };

        self.next_playback_id += 1;
        let playback_id = self.next_playback_id;
        let strategy = handle.strategy();

        match connection.play(handle, playback_id).await {
            Ok(()) => {
                self.playing_id = Some(playback_id);
                if let Some(track) = &self.current {
                    info!(tenant_id = %self.tenant, title = %track.title, strategy, "Now playing");
                }
                self.transition(PlaybackState::Playing);
            }
            Err(e) => {
                self.current = None;
                self.enter_error(SessionErrorKind::PlayerError, e.to_string(), AfterError::NextTrack);
            }
        }
    }

    async fn handle_signal(&mut self, signal: TransportSignal) {
        let TransportSignal { playback_id, kind } = signal;

        // Connection loss is not tied to one stream
        if let SignalKind::Disconnected(reason) = &kind {
            if self.state != PlaybackState::Idle {
                self.halt_current().await;
                self.connection_lost(reason.clone());
            }
            return;
        }

        if self.playing_id != Some(playback_id) {
            debug!(tenant_id = %self.tenant, playback_id, "Ignoring stale transport signal");
            return;
        }
        self.playing_id = None;
        self.current = None;

        match kind {
            SignalKind::PlayerError(reason) => {
                error!(tenant_id = %self.tenant, "Player error: {}", reason);
                self.enter_error(SessionErrorKind::PlayerError, reason, AfterError::NextTrack);
            }
            _ => {
                debug!(tenant_id = %self.tenant, "Track ended");
                self.start_next();
            }
        }
    }

    // ========================================
    // Transitions
    // ========================================

    /// Set the new state and publish the summary
    fn transition(&mut self, next: PlaybackState) {
        debug!(tenant_id = %self.tenant, from = %self.state, to = %next, "State transition");
        self.state = next;
        self.pending_after = None;
        let event = self.snapshot().into_event(self.tenant.clone());
        self.deps.publisher.emit(event);
    }

    fn publish_queue(&self) {
        self.deps.publisher.emit(GmpEvent::QueueChanged {
            tenant_id: self.tenant.clone(),
            queue: self.queue.snapshot(),
            timestamp: Utc::now(),
        });
    }

    /// Dequeue the next track and resolve it, or go idle
    fn start_next(&mut self) {
        match self.queue.dequeue() {
            Some(track) => self.begin_resolving(track),
            None => {
                self.epoch += 1;
                self.current = None;
                if self.state != PlaybackState::Idle {
                    info!(tenant_id = %self.tenant, "Queue finished");
                    self.transition(PlaybackState::Idle);
                }
            }
        }
    }

    fn begin_resolving(&mut self, track: TrackReference) {
        self.epoch += 1;
        self.attempts = 0;
        self.current = Some(track);
        self.transition(PlaybackState::Resolving);
        self.spawn_attempt();
    }

    /// Launch the next resolution attempt for the current track
    ///
    /// Attempt `n` (0-based) waits `n * retry_base_delay` first.
    fn spawn_attempt(&mut self) {
        let Some(track) = self.current.clone() else {
            return;
        };

        let delay = self.deps.settings.retry_delay(self.attempts);
        self.attempts += 1;

        let cancel = CancellationToken::new();
        self.resolve_cancel = Some(cancel.clone());

        let epoch = self.epoch;
        let attempt = self.attempts;
        let resolver = self.deps.resolver.clone();
        let tx = self.internal_tx.clone();
        let tenant = self.tenant.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            debug!(tenant_id = %tenant, title = %track.title, attempt, "Resolving");
            let result = resolver.resolve(&track, &cancel).await;
            let _ = tx.send(Internal::Resolved { epoch, result });
        });
    }

    fn begin_join(&mut self, channel: ChannelRef) {
        let epoch = self.epoch;
        let transport = self.deps.transport.clone();
        let timeout = self.deps.settings.join_timeout;
        let tenant = self.tenant.clone();
        let signals = self.signal_tx.clone();
        let tx = self.internal_tx.clone();
        let cancel = CancellationToken::new();
        self.join_cancel = Some(cancel.clone());

        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.join(&tenant, &channel, signals)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Transport(format!("join timed out after {:?}", timeout))),
            };

            if cancel.is_cancelled() {
                if result.is_ok() {
                    debug!(tenant_id = %tenant, channel = %channel, "Join finished after stop, releasing");
                    transport.release(&tenant).await;
                }
                return;
            }

            let _ = tx.send(Internal::Joined {
                epoch,
                channel,
                result,
            });
        });
        self.join_task = Some(task);
    }

    /// Cancel an in-flight join and wait for it to settle
    ///
    /// Bounded by `join_timeout`. Once this returns, a join that was
    /// still running has released whatever it connected.
    async fn abandon_join(&mut self) {
        let Some(cancel) = self.join_cancel.take() else {
            return;
        };
        cancel.cancel();
        if let Some(task) = self.join_task.take() {
            if let Err(e) = task.await {
                warn!(tenant_id = %self.tenant, "Join task failed: {}", e);
            }
        }
    }

    /// Enter Error, publish the cause and schedule the follow-up
    fn enter_error(&mut self, kind: SessionErrorKind, message: String, then: AfterError) {
        self.epoch += 1;
        self.current = None;
        self.deps.publisher.emit(GmpEvent::SessionError {
            tenant_id: self.tenant.clone(),
            kind,
            message,
            timestamp: Utc::now(),
        });
        self.transition(PlaybackState::Error);
        self.pending_after = Some(then);

        let epoch = self.epoch;
        let delay = self.deps.settings.advance_delay;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::AdvanceDue {
                epoch,
                action: then,
            });
        });
    }

    /// One re-join of the last channel, keeping the interrupted track
    fn connection_lost(&mut self, reason: String) {
        warn!(tenant_id = %self.tenant, "Connection lost: {}", reason);
        self.connection = None;
        if let Some(track) = self.current.take() {
            self.interrupted = Some(track);
        }

        match self.channel.clone() {
            Some(channel) if !self.rejoining => {
                self.epoch += 1;
                self.rejoining = true;
                self.join_retries_left = 0;
                self.transition(PlaybackState::Connecting);
                self.begin_join(channel);
            }
            _ => {
                self.rejoining = false;
                self.enter_error(SessionErrorKind::ConnectionLost, reason, AfterError::Reset);
            }
        }
    }

    /// Cancel any in-flight resolution and silence the connection
    async fn halt_current(&mut self) {
        self.epoch += 1;
        self.cancel_resolution();
        if self.playing_id.take().is_some() {
            if let Some(connection) = self.live_connection() {
                if let Err(e) = connection.stop().await {
                    warn!(tenant_id = %self.tenant, "Failed to stop playback: {}", e);
                }
            }
        }
    }

    fn cancel_resolution(&mut self) {
        if let Some(cancel) = self.resolve_cancel.take() {
            cancel.cancel();
        }
    }

    fn live_connection(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.connection.as_ref().and_then(Weak::upgrade)
    }
}
