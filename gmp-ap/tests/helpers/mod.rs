//! Test helper modules for GMP playback integration tests
//!
//! Provides reusable test infrastructure components:
//! - ScriptedStrategy: resolver strategy with per-title outcomes
//! - FakeTransport: transport whose signals are triggered by the test
//! - RecordingPublisher: collects every published event
//! - TestHarness: engine wired to the above with millisecond timings

#![allow(dead_code)]

use async_trait::async_trait;
use gmp_ap::config::PlayerSettings;
use gmp_ap::error::{Error, Result};
use gmp_ap::playback::{
    AudioSourceResolver, EventPublisher, PlaybackEngine, ResolverStrategy, SessionDeps,
    StreamHandle, StreamSource, TrackRequest,
};
use gmp_ap::search::{SearchProvider, SearchResult};
use gmp_ap::transport::{
    ChannelRef, SignalKind, SignalSender, Transport, TransportSignal, VoiceConnection,
};
use gmp_common::{GmpEvent, PlaybackState, TenantId, TrackReference};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Generous upper bound for anything the tests wait on
pub const WAIT: Duration = Duration::from_secs(3);

pub fn track(title: &str) -> TrackReference {
    TrackReference::new(title, title.to_lowercase().replace(' ', "-"))
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolver strategy whose outcome depends on the track title
#[derive(Default)]
pub struct ScriptedStrategy {
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, u32>>,
    cancelled: Mutex<u32>,
}

impl ScriptedStrategy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every attempt for `title` fails
    pub fn fail(&self, title: &str) {
        self.failing.lock().unwrap().insert(title.to_string());
    }

    /// Attempts for `title` never finish on their own
    pub fn hang(&self, title: &str) {
        self.hanging.lock().unwrap().insert(title.to_string());
    }

    pub fn calls(&self, title: &str) -> u32 {
        self.calls.lock().unwrap().get(title).copied().unwrap_or(0)
    }

    /// Hanging attempts that were cancelled
    pub fn cancelled(&self) -> u32 {
        *self.cancelled.lock().unwrap()
    }
}

struct CancelGuard<'a>(&'a Mutex<u32>);

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap() += 1;
    }
}

#[async_trait]
impl ResolverStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn resolve(
        &self,
        track: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(track.title.clone())
            .or_insert(0) += 1;

        if self.hanging.lock().unwrap().contains(&track.title) {
            // Counted whether the token fires first or the future is dropped
            let _guard = CancelGuard(&self.cancelled);
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }

        if self.failing.lock().unwrap().contains(&track.title) {
            return Err(Error::Internal(format!("cannot extract {}", track.title)));
        }

        Ok(StreamHandle::new(
            StreamSource::Url(format!("scripted://{}", track.title)),
            "scripted",
        )
        .for_track(track))
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One `play` call seen by a fake connection
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRecord {
    pub playback_id: u64,
    pub url: String,
    pub seek_offset_secs: u64,
}

pub struct FakeConnection {
    channel: ChannelRef,
    signals: Mutex<SignalSender>,
    plays: Mutex<Vec<PlayRecord>>,
    pauses: Mutex<u32>,
    resumes: Mutex<u32>,
    stops: Mutex<u32>,
}

impl FakeConnection {
    fn new(channel: ChannelRef, signals: SignalSender) -> Self {
        Self {
            channel,
            signals: Mutex::new(signals),
            plays: Mutex::new(Vec::new()),
            pauses: Mutex::new(0),
            resumes: Mutex::new(0),
            stops: Mutex::new(0),
        }
    }

    pub fn plays(&self) -> Vec<PlayRecord> {
        self.plays.lock().unwrap().clone()
    }

    pub fn last_play(&self) -> Option<PlayRecord> {
        self.plays.lock().unwrap().last().cloned()
    }

    pub fn stops(&self) -> u32 {
        *self.stops.lock().unwrap()
    }

    pub fn signal(&self, playback_id: u64, kind: SignalKind) {
        let _ = self
            .signals
            .lock()
            .unwrap()
            .send(TransportSignal { playback_id, kind });
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    async fn play(&self, stream: StreamHandle, playback_id: u64) -> Result<()> {
        let seek_offset_secs = stream.seek_offset_secs();
        let url = match stream.into_source() {
            StreamSource::Url(url) => url,
            StreamSource::Reader(_) => "reader".to_string(),
        };
        self.plays.lock().unwrap().push(PlayRecord {
            playback_id,
            url,
            seek_offset_secs,
        });
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        *self.pauses.lock().unwrap() += 1;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        *self.resumes.lock().unwrap() += 1;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }
}

/// Transport driven entirely by the test
#[derive(Default)]
pub struct FakeTransport {
    connections: Mutex<HashMap<TenantId, Arc<FakeConnection>>>,
    failing_joins: Mutex<u32>,
    join_delay: Mutex<Duration>,
    joins: Mutex<u32>,
    releases: Mutex<u32>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `count` joins fail
    pub fn fail_joins(&self, count: u32) {
        *self.failing_joins.lock().unwrap() = count;
    }

    /// Every join takes `delay` before it completes
    pub fn set_join_delay(&self, delay: Duration) {
        *self.join_delay.lock().unwrap() = delay;
    }

    pub fn joins(&self) -> u32 {
        *self.joins.lock().unwrap()
    }

    pub fn releases(&self) -> u32 {
        *self.releases.lock().unwrap()
    }

    pub fn connection(&self, tenant: &TenantId) -> Option<Arc<FakeConnection>> {
        self.connections.lock().unwrap().get(tenant).cloned()
    }

    pub fn is_connected(&self, tenant: &TenantId) -> bool {
        self.connection(tenant).is_some()
    }

    /// Report the most recent stream as finished
    pub fn end_current(&self, tenant: &TenantId) {
        let connection = self.connection(tenant).expect("tenant not connected");
        let play = connection.last_play().expect("nothing played");
        connection.signal(play.playback_id, SignalKind::TrackEnded);
    }

    /// Report a player failure for the most recent stream
    pub fn fail_current(&self, tenant: &TenantId, reason: &str) {
        let connection = self.connection(tenant).expect("tenant not connected");
        let play = connection.last_play().expect("nothing played");
        connection.signal(play.playback_id, SignalKind::PlayerError(reason.to_string()));
    }

    /// Drop the connection and tell the session about it
    pub fn disconnect(&self, tenant: &TenantId) {
        let connection = self
            .connections
            .lock()
            .unwrap()
            .remove(tenant)
            .expect("tenant not connected");
        let playback_id = connection.last_play().map(|p| p.playback_id).unwrap_or(0);
        connection.signal(playback_id, SignalKind::Disconnected("network gone".to_string()));
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn join(
        &self,
        tenant: &TenantId,
        channel: &ChannelRef,
        signals: SignalSender,
    ) -> Result<Arc<dyn VoiceConnection>> {
        *self.joins.lock().unwrap() += 1;

        let delay = *self.join_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failing = self.failing_joins.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Transport(format!("cannot reach {}", channel)));
            }
        }

        let mut connections = self.connections.lock().unwrap();
        if let Some(existing) = connections.get(tenant) {
            if existing.channel.id == channel.id {
                *existing.signals.lock().unwrap() = signals;
                return Ok(existing.clone());
            }
        }
        let connection = Arc::new(FakeConnection::new(channel.clone(), signals));
        connections.insert(tenant.clone(), connection.clone());
        Ok(connection)
    }

    async fn current_channel(&self, tenant: &TenantId) -> Option<ChannelRef> {
        self.connection(tenant).map(|c| c.channel.clone())
    }

    async fn channels(&self, _tenant: &TenantId) -> Result<Vec<ChannelRef>> {
        Ok(vec![
            ChannelRef::named("voice-1", "Lounge"),
            ChannelRef::named("voice-2", "Stage"),
        ])
    }

    async fn release(&self, tenant: &TenantId) {
        *self.releases.lock().unwrap() += 1;
        self.connections.lock().unwrap().remove(tenant);
    }
}

// ============================================================================
// Search
// ============================================================================

/// Search provider returning `"<query> (result N)"` tracks
pub struct StubSearch;

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResult>> {
        if query.contains("nothing") {
            return Ok(Vec::new());
        }
        Ok((1..=3)
            .map(|n| {
                let title = format!("{} (result {})", query, (page - 1) * 3 + n);
                SearchResult::new(track(&title).with_duration(200), Some("Channel".to_string()), Some(1_000))
            })
            .collect())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<GmpEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<GmpEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every state event for `tenant`, in order
    pub fn state_events(&self, tenant: &TenantId) -> Vec<(PlaybackState, Option<String>, Vec<String>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                GmpEvent::SessionStateChanged {
                    tenant_id,
                    state,
                    current_track,
                    queue,
                    ..
                } if &tenant_id == tenant => Some((
                    state,
                    current_track.map(|t| t.title),
                    queue.into_iter().map(|t| t.title).collect(),
                )),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self, tenant: &TenantId) -> Vec<PlaybackState> {
        self.state_events(tenant).into_iter().map(|(s, _, _)| s).collect()
    }

    /// Number of transitions into `state` for `tenant`
    pub fn count_state(&self, tenant: &TenantId, state: PlaybackState) -> usize {
        self.states(tenant).into_iter().filter(|s| *s == state).count()
    }

    /// Poll until `predicate` holds over the recorded events
    pub async fn wait_until(&self, what: &str, predicate: impl Fn(&[GmpEvent]) -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if predicate(&self.events()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {}; events: {:#?}", what, self.events());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait for the `n`-th transition of `tenant` into `state`
    pub async fn wait_for_state(&self, tenant: &TenantId, state: PlaybackState, n: usize) {
        let what = format!("{} transition #{} for {}", state, n, tenant);
        self.wait_until(&what, |_| self.count_state(tenant, state) >= n).await;
    }
}

impl EventPublisher for RecordingPublisher {
    fn emit(&self, event: GmpEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn fast_settings() -> PlayerSettings {
    PlayerSettings {
        max_resolve_attempts: 3,
        retry_base_delay: Duration::from_millis(10),
        resolve_attempt_timeout: Duration::from_millis(500),
        join_timeout: Duration::from_millis(500),
        advance_delay: Duration::from_millis(20),
        command_buffer: 16,
    }
}

pub struct TestHarness {
    pub engine: Arc<PlaybackEngine>,
    pub strategy: Arc<ScriptedStrategy>,
    pub transport: Arc<FakeTransport>,
    pub events: Arc<RecordingPublisher>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(fast_settings())
    }

    pub fn with_settings(settings: PlayerSettings) -> Self {
        let strategy = ScriptedStrategy::new();
        let transport = FakeTransport::new();
        let events = RecordingPublisher::new();

        let resolver = AudioSourceResolver::new(
            vec![strategy.clone() as Arc<dyn ResolverStrategy>],
            settings.resolve_attempt_timeout,
        );
        let deps = SessionDeps {
            resolver: Arc::new(resolver),
            transport: transport.clone(),
            publisher: events.clone(),
            settings,
        };
        let engine = Arc::new(PlaybackEngine::new(deps, Arc::new(StubSearch)));

        Self {
            engine,
            strategy,
            transport,
            events,
        }
    }

    /// Enqueue a track by title on channel `voice-1`
    pub async fn enqueue(&self, tenant: &TenantId, title: &str) -> Result<usize> {
        self.engine
            .enqueue(
                tenant,
                TrackRequest::Track(track(title)),
                Some(ChannelRef::new("voice-1")),
            )
            .await
    }

    /// Enqueue a track and wait until it is the one playing
    pub async fn play(&self, tenant: &TenantId, title: &str) {
        self.enqueue(tenant, title).await.unwrap();
        self.wait_playing(tenant, title).await;
    }

    /// Wait until a `Playing` event names `title` as current
    pub async fn wait_playing(&self, tenant: &TenantId, title: &str) {
        let what = format!("{} playing for {}", title, tenant);
        self.events
            .wait_until(&what, |_| {
                self.events
                    .state_events(tenant)
                    .iter()
                    .any(|(s, t, _)| *s == PlaybackState::Playing && t.as_deref() == Some(title))
            })
            .await;
    }

    /// Wait for the `SessionClosed` event of `tenant`
    pub async fn wait_closed(&self, tenant: &TenantId) {
        let what = format!("session close for {}", tenant);
        self.events
            .wait_until(&what, |events| {
                events.iter().any(|e| {
                    matches!(e, GmpEvent::SessionClosed { tenant_id, .. } if tenant_id == tenant)
                })
            })
            .await;
    }
}
