//! Server-Sent Events (SSE) utilities
//!
//! Turns the EventBus into an SSE response for the presentation layer.

use crate::events::GmpEvent;
use crate::track::TenantId;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Keep-alive interval for event streams
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Create an SSE stream of GMP events
///
/// `rx` should be subscribed before `initial` is computed, so no change
/// between the two is lost. `initial` is sent right after the connection
/// status. When `tenant` is set, only events for that tenant are forwarded.
/// Lagged receivers skip the dropped events and keep streaming.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(ctx): State<AppContext>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     gmp_common::sse::create_event_sse_stream(ctx.event_bus.subscribe(), None, None)
/// }
/// ```
pub fn create_event_sse_stream(
    mut rx: broadcast::Receiver<GmpEvent>,
    tenant: Option<TenantId>,
    initial: Option<GmpEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        tenant = tenant.as_ref().map(|t| t.as_str()).unwrap_or("*"),
        "New SSE client connected"
    );

    let stream = async_stream::stream! {
        // Initial status so clients can show a connection indicator
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        if let Some(sse_event) = initial.as_ref().and_then(to_sse_event) {
            yield Ok(sse_event);
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(tenant) = &tenant {
                        if event.tenant_id() != tenant {
                            continue;
                        }
                    }
                    if let Some(sse_event) = to_sse_event(&event) {
                        yield Ok(sse_event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE client lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Event bus closed, ending SSE stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// Convert a GmpEvent to an axum SSE event (`event:` = type name, `data:` = JSON)
pub fn to_sse_event(event: &GmpEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => {
            debug!("Broadcasting SSE event: {}", event.event_type());
            Some(Event::default().event(event.event_type()).data(json))
        }
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
