//! Object address space: metadata lookup, existence, listing and deletion,
//! always scoped to a single container.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::container::ContainerHandle;
use crate::error::Result;
use crate::session::SessionManager;
use crate::transport::{ObjectInfo, Transport};

/// Metadata snapshot for one stored object.
///
/// Holds the owning container by name only; containers do not track their
/// objects and descriptors do not keep containers alive.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    container: String,
    name: String,
    size: u64,
    last_modified: DateTime<Utc>,
    content_type: String,
}

impl ObjectDescriptor {
    pub(crate) fn from_info(container: &ContainerHandle, info: ObjectInfo) -> Self {
        Self {
            container: container.name().to_string(),
            name: info.name,
            size: info.size,
            last_modified: info.last_modified,
            content_type: info.content_type,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Stat/exists/list/delete over the objects of one container at a time.
///
/// Object names are opaque and may contain slashes; the remote service owns
/// naming semantics and nothing is normalized here.
pub struct ObjectSpace {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
}

impl ObjectSpace {
    pub fn new(transport: Arc<dyn Transport>, sessions: Arc<SessionManager>) -> Self {
        Self { transport, sessions }
    }

    pub async fn stat(&self, container: &ContainerHandle, name: &str) -> Result<ObjectDescriptor> {
        let session = self.sessions.ensure_valid().await?;
        let info = self
            .transport
            .head_object(session.grant(), container.name(), name)
            .await?;
        Ok(ObjectDescriptor::from_info(container, info))
    }

    /// Absence is a normal outcome here, not an error. Everything else
    /// propagates untouched.
    pub async fn exists(&self, container: &ContainerHandle, name: &str) -> Result<bool> {
        match self.stat(container, name).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn list(&self, container: &ContainerHandle) -> Result<Vec<ObjectDescriptor>> {
        let session = self.sessions.ensure_valid().await?;
        let infos = self
            .transport
            .list_objects(session.grant(), container.name())
            .await?;
        Ok(infos
            .into_iter()
            .map(|info| ObjectDescriptor::from_info(container, info))
            .collect())
    }

    /// Deleting an absent object surfaces `NotFound`; the façade decides
    /// whether to swallow it.
    pub async fn delete(&self, container: &ContainerHandle, name: &str) -> Result<()> {
        let session = self.sessions.ensure_valid().await?;
        self.transport
            .delete_object(session.grant(), container.name(), name)
            .await
    }
}
