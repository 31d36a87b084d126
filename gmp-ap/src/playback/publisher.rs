//! Outbound event interface
//!
//! The orchestrator reaches outward only through `EventPublisher`, injected
//! at construction. Delivery is fire-and-forget.

use gmp_common::{EventBus, GmpEvent};

/// Receives state-change notifications from sessions
pub trait EventPublisher: Send + Sync {
    fn emit(&self, event: GmpEvent);
}

impl EventPublisher for EventBus {
    fn emit(&self, event: GmpEvent) {
        self.emit_lossy(event);
    }
}
