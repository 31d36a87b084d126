//! Playback engine
//!
//! Entry point for the command dispatcher and the HTTP adapter. Validates
//! requests, turns queries into tracks, and routes every command to the
//! addressed session through the registry.
//!
//! Commands addressed to a tenant without a session follow the registry
//! inconsistency rules: `stop` succeeds, the others report the result the
//! caller would get from an idle session.

use super::registry::SessionRegistry;
use super::session::{SessionCommand, SessionDeps, SessionHandle, SessionSnapshot};
use crate::error::{Error, Result};
use crate::search::{SearchProvider, SearchResult};
use crate::transport::{ChannelRef, Transport};
use gmp_common::{TenantId, TrackReference};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What the caller wants played
#[derive(Debug, Clone)]
pub enum TrackRequest {
    /// A known track
    Track(TrackReference),
    /// Free text; the first search result is played
    Query {
        text: String,
        requested_by: Option<String>,
    },
}

impl TrackRequest {
    pub fn query(text: impl Into<String>) -> Self {
        TrackRequest::Query {
            text: text.into(),
            requested_by: None,
        }
    }
}

/// Multi-tenant playback orchestrator
pub struct PlaybackEngine {
    registry: SessionRegistry,
    transport: Arc<dyn Transport>,
    search: Arc<dyn SearchProvider>,
    join_timeout: Duration,
}

impl PlaybackEngine {
    pub fn new(deps: SessionDeps, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            transport: deps.transport.clone(),
            join_timeout: deps.settings.join_timeout,
            registry: SessionRegistry::new(deps),
            search,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Add a track to the tenant's queue, starting playback if idle
    ///
    /// Returns the queue position (1-based) the track was placed at.
    pub async fn enqueue(
        &self,
        tenant: &TenantId,
        request: TrackRequest,
        channel: Option<ChannelRef>,
    ) -> Result<usize> {
        let channel = match channel {
            Some(channel) => Some(channel),
            None => self.transport.current_channel(tenant).await,
        };
        if channel.is_none() && self.registry.get(tenant).await.is_none() {
            return Err(Error::UserInput(
                "no channel specified and none connected".to_string(),
            ));
        }

        let track = self.track_for(request).await?;
        info!(tenant_id = %tenant, title = %track.title, "Enqueue");

        let send = |handle: SessionHandle, track: TrackReference, channel: Option<ChannelRef>| async move {
            handle
                .request(|reply| SessionCommand::Enqueue {
                    track,
                    channel,
                    reply,
                })
                .await
        };

        let handle = self.registry.get_or_create(tenant).await;
        if let Some(result) = send(handle, track.clone(), channel.clone()).await {
            return result;
        }

        // Session unregistered itself between lookup and send
        debug!(tenant_id = %tenant, "Session closed during enqueue, retrying on a fresh session");
        let handle = self.registry.get_or_create(tenant).await;
        send(handle, track, channel)
            .await
            .ok_or_else(|| Error::Internal(format!("session for {} unavailable", tenant)))?
    }

    /// Connect the tenant to a channel without queueing anything
    ///
    /// A later `enqueue` without a channel plays on it. Rejected with
    /// `SessionBusy` while a session is connected elsewhere.
    pub async fn join(&self, tenant: &TenantId, channel_id: &str) -> Result<ChannelRef> {
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Err(Error::UserInput("channel id is required".to_string()));
        }

        let channel = self
            .transport
            .channels(tenant)
            .await?
            .into_iter()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| Error::ChannelNotFound(channel_id.to_string()))?;

        let current = self.transport.current_channel(tenant).await;
        if current.as_ref().map(|c| c.id.as_str()) == Some(channel_id) {
            debug!(tenant_id = %tenant, channel = %channel, "Already connected");
            return Ok(channel);
        }
        if self.registry.get(tenant).await.is_some() {
            return Err(Error::SessionBusy(tenant.clone()));
        }

        // No session listens yet; the first session to join takes the signals over
        let (signals, _) = mpsc::unbounded_channel();
        tokio::time::timeout(self.join_timeout, self.transport.join(tenant, &channel, signals))
            .await
            .map_err(|_| Error::Transport(format!("join timed out after {:?}", self.join_timeout)))??;

        info!(tenant_id = %tenant, channel = %channel, "Joined channel");
        Ok(channel)
    }

    pub async fn skip(&self, tenant: &TenantId) -> Result<()> {
        self.route(tenant, |reply| SessionCommand::Skip { reply })
            .await
            .unwrap_or_else(|| Err(Error::NoActiveSession(tenant.clone())))
    }

    /// Clear the queue and release the connection; always succeeds
    pub async fn stop(&self, tenant: &TenantId) -> Result<()> {
        match self.route(tenant, |reply| SessionCommand::Stop { reply }).await {
            Some(result) => result,
            None => {
                // A connection may outlive its session
                self.transport.release(tenant).await;
                Ok(())
            }
        }
    }

    pub async fn pause(&self, tenant: &TenantId) -> Result<()> {
        self.route(tenant, |reply| SessionCommand::Pause { reply })
            .await
            .unwrap_or(Err(Error::NotPlaying))
    }

    pub async fn resume(&self, tenant: &TenantId) -> Result<()> {
        self.route(tenant, |reply| SessionCommand::Resume { reply })
            .await
            .unwrap_or(Err(Error::NotPaused))
    }

    /// Restart the current track at `offset_secs`
    pub async fn seek(&self, tenant: &TenantId, offset_secs: u64) -> Result<()> {
        self.route(tenant, |reply| SessionCommand::Seek { offset_secs, reply })
            .await
            .unwrap_or_else(|| Err(Error::NoActiveSession(tenant.clone())))
    }

    pub async fn get_state(&self, tenant: &TenantId) -> SessionSnapshot {
        self.route(tenant, |reply| SessionCommand::Snapshot { reply })
            .await
            .unwrap_or_else(SessionSnapshot::idle)
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::UserInput("search query is empty".to_string()));
        }
        self.search.search(query, page).await
    }

    pub async fn channels(&self, tenant: &TenantId) -> Result<Vec<ChannelRef>> {
        self.transport.channels(tenant).await
    }

    /// Tenants with a live session
    pub async fn sessions(&self) -> Vec<TenantId> {
        self.registry.tenants().await
    }

    /// Send to an existing session; `None` when there is none
    async fn route<T>(
        &self,
        tenant: &TenantId,
        make: impl FnOnce(tokio::sync::oneshot::Sender<T>) -> SessionCommand,
    ) -> Option<T> {
        let handle = self.registry.get(tenant).await?;
        handle.request(make).await
    }

    async fn track_for(&self, request: TrackRequest) -> Result<TrackReference> {
        match request {
            TrackRequest::Track(track) => {
                if track.source_id.trim().is_empty() {
                    return Err(Error::UserInput("track has no source id".to_string()));
                }
                Ok(track)
            }
            TrackRequest::Query { text, requested_by } => {
                let results = self.search(&text, 1).await?;
                let first = results
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::UserInput(format!("no results for '{}'", text.trim())))?;

                let mut track = first.track;
                if requested_by.is_some() {
                    track.requested_by = requested_by;
                }
                Ok(track)
            }
        }
    }
}
