//! Server-Sent Events endpoint
//!
//! Pushes every `GmpEvent` to browsers, optionally filtered to one tenant.
//! A tenant-filtered stream opens with that tenant's current state.

use crate::api::server::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use gmp_common::TenantId;
use serde::Deserialize;
use std::convert::Infallible;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    tenant_id: Option<String>,
}

/// GET /api/v1/events[?tenant_id=] - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let tenant = query
        .tenant_id
        .filter(|t| !t.trim().is_empty())
        .map(TenantId::from);

    let rx = ctx.event_bus.subscribe();
    let initial = match &tenant {
        Some(tenant) => Some(ctx.engine.get_state(tenant).await.into_event(tenant.clone())),
        None => None,
    };
    gmp_common::sse::create_event_sse_stream(rx, tenant, initial)
}
