//! Remote endpoint seam.
//!
//! Everything that actually touches the wire lives behind the [`Transport`]
//! trait: one authentication call plus the container/object primitives the
//! higher layers compose. The HTTP implementation speaks the Cloud Files v1
//! protocol; the in-memory implementation backs the test suite.

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::MemoryTransport;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;

/// Lazy sequence of body chunks from a download.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// What a successful authentication round-trip hands back.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: String,
    pub storage_url: String,
    /// Public (CDN) endpoint, when the account has one.
    pub cdn_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Container-level metadata from a HEAD on the container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub name: String,
    pub object_count: u64,
    pub bytes_used: u64,
}

/// Object-level metadata from a HEAD or a listing entry.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
}

/// Primitive operations against the remote object store.
///
/// Object names are opaque byte sequences as far as this trait is concerned;
/// they may contain slashes and are never normalized client-side.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Exchange credentials for a token and service endpoints.
    /// Rejected credentials must surface as `Authentication`, never `Transfer`.
    async fn authenticate(&self, username: &str, api_key: &str) -> Result<AuthGrant>;

    /// Look up a container. Absent containers are `NotFound`; nothing is
    /// created implicitly.
    async fn head_container(&self, grant: &AuthGrant, container: &str) -> Result<ContainerInfo>;

    async fn head_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
    ) -> Result<ObjectInfo>;

    /// Open a single forward pass over the object's bytes.
    async fn get_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
    ) -> Result<ByteStream>;

    /// Store the whole object in one atomic call.
    async fn put_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()>;

    /// Delete an object. Absence surfaces as `NotFound`; the caller decides
    /// whether that matters.
    async fn delete_object(&self, grant: &AuthGrant, container: &str, name: &str) -> Result<()>;

    async fn list_objects(&self, grant: &AuthGrant, container: &str) -> Result<Vec<ObjectInfo>>;
}
