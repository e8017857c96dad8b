//! Credential and session lifecycle.
//!
//! One `SessionManager` owns the authentication state for one storage
//! backend instance. Nothing here is process-global: two backends in the
//! same process hold two independent sessions.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StorageOptions;
use crate::error::Result;
use crate::transport::{AuthGrant, Transport};

/// An authenticated, time-bounded grant plus the region it was issued for.
///
/// The generation counter increments every time the manager replaces the
/// session, which is what lets container handles notice they were resolved
/// under an older token.
#[derive(Debug, Clone)]
pub struct Session {
    grant: AuthGrant,
    region: String,
    generation: u64,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.grant.token
    }

    pub fn endpoint(&self) -> &str {
        &self.grant.storage_url
    }

    pub fn cdn_endpoint(&self) -> Option<&str> {
        self.grant.cdn_url.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grant(&self) -> &AuthGrant {
        &self.grant
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.grant.expires_at
    }
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    username: String,
    api_key: String,
    region: String,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, options: &StorageOptions) -> Self {
        Self {
            transport,
            username: options.username.clone(),
            api_key: options.api_key.clone(),
            region: options.region.clone(),
            current: RwLock::new(None),
        }
    }

    /// Force a fresh authentication round-trip, replacing any live session.
    pub async fn authenticate(&self) -> Result<Session> {
        let mut guard = self.current.write().await;
        self.renew(&mut guard).await
    }

    /// Return the live session, re-authenticating transparently when it has
    /// expired. The common path is a read lock and a clone.
    pub async fn ensure_valid(&self) -> Result<Session> {
        {
            let guard = self.current.read().await;
            if let Some(session) = guard.as_ref() {
                if !session.is_expired() {
                    return Ok(session.clone());
                }
            }
        }

        let mut guard = self.current.write().await;
        // Re-check: another caller may have renewed while we waited.
        if let Some(session) = guard.as_ref() {
            if !session.is_expired() {
                return Ok(session.clone());
            }
        }
        self.renew(&mut guard).await
    }

    pub async fn current_generation(&self) -> Option<u64> {
        self.current.read().await.as_ref().map(Session::generation)
    }

    async fn renew(&self, slot: &mut Option<Session>) -> Result<Session> {
        let grant = self
            .transport
            .authenticate(&self.username, &self.api_key)
            .await?;

        let generation = slot.as_ref().map(|s| s.generation + 1).unwrap_or(0);
        let session = Session {
            grant,
            region: self.region.clone(),
            generation,
        };
        *slot = Some(session.clone());

        tracing::info!(
            "session established for region {} (generation {})",
            self.region,
            generation
        );
        Ok(session)
    }
}
