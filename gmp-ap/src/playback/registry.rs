//! Session registry
//!
//! Tenant id → running session. The map's key space is the only state shared
//! between sessions; everything inside a session belongs to its actor.
//!
//! Sessions are created lazily and unregister themselves when they reach
//! Idle with an empty queue. A handle obtained just before that removal may
//! find the session gone; `SessionHandle::request` then returns `None`.

use super::session::{self, SessionDeps, SessionHandle, SessionMap};
use gmp_common::TenantId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Concurrency-safe map of live sessions
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            deps,
        }
    }

    /// Existing session, or a new Idle one created atomically
    pub async fn get_or_create(&self, tenant: &TenantId) -> SessionHandle {
        if let Some(handle) = self.live(tenant).await {
            return handle;
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(tenant).filter(|h| h.is_alive()) {
            return handle.clone();
        }

        let handle = session::spawn(tenant.clone(), self.deps.clone(), Arc::downgrade(&self.sessions));
        sessions.insert(tenant.clone(), handle.clone());
        handle
    }

    /// Existing session, if any
    pub async fn get(&self, tenant: &TenantId) -> Option<SessionHandle> {
        self.live(tenant).await
    }

    /// Drop the session if present; no-op otherwise
    ///
    /// The actor stops once the last handle is gone, cancelling any
    /// in-flight resolution.
    pub async fn remove(&self, tenant: &TenantId) -> bool {
        let removed = self.sessions.write().await.remove(tenant).is_some();
        if removed {
            debug!(tenant_id = %tenant, "Session removed from registry");
        }
        removed
    }

    /// Tenants with a live session, sorted
    pub async fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|h| h.is_alive())
            .map(|h| h.tenant().clone())
            .collect();
        tenants.sort();
        tenants
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn live(&self, tenant: &TenantId) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(tenant)
            .filter(|h| h.is_alive())
            .cloned()
    }
}
