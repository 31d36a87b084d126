//! HTTP request handlers
//!
//! One handler per engine operation. Errors are mapped to status codes by
//! `error_response`; the body is always `{status, error}`.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::playback::{SessionSnapshot, TrackRequest};
use crate::search::SearchResult;
use crate::transport::ChannelRef;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gmp_common::{TenantId, TrackReference};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    query: String,
    #[serde(default = "first_page")]
    page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    query: String,
    page: u32,
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    sessions: Vec<TenantId>,
}

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    channels: Vec<ChannelRef>,
}

/// Body of `POST .../enqueue`: exactly one of `track` or `query`
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    track: Option<TrackReference>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    requested_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub status: String,
    pub position: usize,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    status: String,
    channel: ChannelRef,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_secs: u64,
}

// ============================================================================
// Error Mapping
// ============================================================================

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::UserInput(_) => StatusCode::BAD_REQUEST,
        Error::NoActiveSession(_) | Error::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        Error::NotPlaying | Error::NotPaused | Error::SessionBusy(_) => StatusCode::CONFLICT,
        Error::Search(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!("Request failed: {}", error);
    }
    (
        status,
        Json(ErrorResponse {
            status: "error".to_string(),
            error: error.to_string(),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "gmp-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Search
// ============================================================================

/// GET /api/v1/search?query=&page=
pub async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchResponse> {
    let page = params.page.max(1);
    let results = ctx
        .engine
        .search(&params.query, page)
        .await
        .map_err(error_response)?;

    Ok(Json(SearchResponse {
        query: params.query,
        page,
        results,
    }))
}

// ============================================================================
// Sessions
// ============================================================================

/// GET /api/v1/sessions - tenants with a live session
pub async fn list_sessions(State(ctx): State<AppContext>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: ctx.engine.sessions().await,
    })
}

/// GET /api/v1/sessions/:tenant_id/state
pub async fn get_state(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
) -> Json<SessionSnapshot> {
    Json(ctx.engine.get_state(&TenantId::from(tenant_id)).await)
}

/// GET /api/v1/sessions/:tenant_id/channels
pub async fn list_channels(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
) -> ApiResult<ChannelsResponse> {
    let channels = ctx
        .engine
        .channels(&TenantId::from(tenant_id))
        .await
        .map_err(error_response)?;
    Ok(Json(ChannelsResponse { channels }))
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /api/v1/sessions/:tenant_id/join
pub async fn join(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<JoinResponse> {
    let channel = ctx
        .engine
        .join(&TenantId::from(tenant_id), req.channel_id.as_deref().unwrap_or_default())
        .await
        .map_err(error_response)?;

    Ok(Json(JoinResponse {
        status: "ok".to_string(),
        channel,
    }))
}

/// POST /api/v1/sessions/:tenant_id/enqueue
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<EnqueueResponse> {
    let tenant = TenantId::from(tenant_id);

    let request = match (req.track, req.query) {
        (Some(mut track), None) => {
            if req.requested_by.is_some() {
                track.requested_by = req.requested_by;
            }
            TrackRequest::Track(track)
        }
        (None, Some(text)) => TrackRequest::Query {
            text,
            requested_by: req.requested_by,
        },
        _ => {
            return Err(error_response(Error::UserInput(
                "exactly one of 'track' or 'query' is required".to_string(),
            )))
        }
    };

    let channel = req
        .channel_id
        .filter(|id| !id.trim().is_empty())
        .map(ChannelRef::new);

    let position = ctx
        .engine
        .enqueue(&tenant, request, channel)
        .await
        .map_err(error_response)?;

    info!(tenant_id = %tenant, position, "Enqueued via API");
    Ok(Json(EnqueueResponse {
        status: "ok".to_string(),
        position,
    }))
}

/// POST /api/v1/sessions/:tenant_id/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine
        .skip(&TenantId::from(tenant_id))
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// POST /api/v1/sessions/:tenant_id/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine
        .stop(&TenantId::from(tenant_id))
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// POST /api/v1/sessions/:tenant_id/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine
        .pause(&TenantId::from(tenant_id))
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// POST /api/v1/sessions/:tenant_id/resume
pub async fn resume(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.engine
        .resume(&TenantId::from(tenant_id))
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// POST /api/v1/sessions/:tenant_id/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Path(tenant_id): Path<String>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<StatusResponse> {
    ctx.engine
        .seek(&TenantId::from(tenant_id), req.position_secs)
        .await
        .map_err(error_response)?;
    Ok(ok())
}
