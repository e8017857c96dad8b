//! Container resolution and the per-session handle cache.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::session::{Session, SessionManager};
use crate::transport::Transport;

/// A resolved container, bound to the session it was resolved under.
///
/// Immutable after creation; a new handle is minted when the session is
/// replaced.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    name: String,
    region: String,
    endpoint: String,
    public_url: String,
    public: bool,
    generation: u64,
}

impl ContainerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Base URL public object addresses are built from.
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    fn resolved_under(&self, session: &Session) -> bool {
        self.generation == session.generation()
    }
}

/// Resolves container names against the remote store, caching handles for
/// as long as the owning session stays the same.
pub struct ContainerDirectory {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
    public: bool,
    cache: RwLock<HashMap<String, ContainerHandle>>,
}

impl ContainerDirectory {
    pub fn new(transport: Arc<dyn Transport>, sessions: Arc<SessionManager>, public: bool) -> Self {
        Self {
            transport,
            sessions,
            public,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a container name to a handle. Absent containers are an error;
    /// nothing is created implicitly. Repeated calls under the same session
    /// are served from the cache without touching the network.
    pub async fn resolve(&self, name: &str) -> Result<ContainerHandle> {
        let session = self.sessions.ensure_valid().await?;

        {
            let cache = self.cache.read().await;
            if let Some(handle) = cache.get(name) {
                if handle.resolved_under(&session) {
                    return Ok(handle.clone());
                }
            }
        }

        let info = self
            .transport
            .head_container(session.grant(), name)
            .await?;

        let public_base = if self.public {
            session.cdn_endpoint().unwrap_or_else(|| session.endpoint())
        } else {
            session.endpoint()
        };
        let handle = ContainerHandle {
            name: info.name,
            region: session.region().to_string(),
            endpoint: session.endpoint().to_string(),
            public_url: format!("{}/{}", public_base.trim_end_matches('/'), name),
            public: self.public,
            generation: session.generation(),
        };

        tracing::debug!(
            "container \"{}\" resolved ({} objects, {} bytes)",
            name,
            info.object_count,
            info.bytes_used
        );

        let mut cache = self.cache.write().await;
        cache.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}
