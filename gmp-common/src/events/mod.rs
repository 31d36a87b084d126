//! Event types for the GMP event system
//!
//! Provides the shared event definitions and the EventBus used to push
//! session state to the presentation layer.

// Sub-modules (supporting types)
mod playback_types;

pub use playback_types::{PlaybackState, SessionErrorKind};

use crate::track::{TenantId, TrackReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// GMP event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every event is scoped to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GmpEvent {
    /// The session's state machine took a transition
    ///
    /// Carries the full summary so consumers never need to poll.
    SessionStateChanged {
        tenant_id: TenantId,
        /// State after the transition
        state: PlaybackState,
        /// Current track (present in Resolving, Playing and Paused)
        current_track: Option<TrackReference>,
        is_playing: bool,
        is_paused: bool,
        /// Waiting tracks in play order
        queue: Vec<TrackReference>,
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed without a state transition
    QueueChanged {
        tenant_id: TenantId,
        queue: Vec<TrackReference>,
        timestamp: DateTime<Utc>,
    },

    /// A track was abandoned after every resolution attempt failed
    ///
    /// Non-fatal: the session has already moved on to the next track.
    ResolutionFailed {
        tenant_id: TenantId,
        track: TrackReference,
        /// Attempts made before giving up
        attempts: u32,
        /// Last failure reason
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Session-scoped transport failure
    SessionError {
        tenant_id: TenantId,
        kind: SessionErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The session was dropped from the registry (Idle with an empty queue)
    SessionClosed {
        tenant_id: TenantId,
        timestamp: DateTime<Utc>,
    },
}

impl GmpEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            GmpEvent::SessionStateChanged { .. } => "SessionStateChanged",
            GmpEvent::QueueChanged { .. } => "QueueChanged",
            GmpEvent::ResolutionFailed { .. } => "ResolutionFailed",
            GmpEvent::SessionError { .. } => "SessionError",
            GmpEvent::SessionClosed { .. } => "SessionClosed",
        }
    }

    /// Tenant this event belongs to
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            GmpEvent::SessionStateChanged { tenant_id, .. }
            | GmpEvent::QueueChanged { tenant_id, .. }
            | GmpEvent::ResolutionFailed { tenant_id, .. }
            | GmpEvent::SessionError { tenant_id, .. }
            | GmpEvent::SessionClosed { tenant_id, .. } => tenant_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use gmp_common::events::{EventBus, GmpEvent};
/// use gmp_common::track::TenantId;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(GmpEvent::SessionClosed {
///     tenant_id: TenantId::from("guild-1"),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GmpEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GmpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: GmpEvent) -> Result<usize, broadcast::error::SendError<GmpEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GmpEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
