//! In-memory transport used by the test suite.
//!
//! Behaves like a tiny single-account object store: credentials are checked
//! on authenticate, containers must be created up front, and every operation
//! is counted so tests can assert exactly how many network calls an API
//! sequence would have made.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{AuthGrant, ByteStream, ContainerInfo, ObjectInfo, Transport};
use crate::error::{Result, StorageError};

const DOWNLOAD_CHUNK_SIZE: usize = 4096;

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct TransportCalls {
    authenticate: AtomicUsize,
    head_container: AtomicUsize,
    head_object: AtomicUsize,
    get_object: AtomicUsize,
    put_object: AtomicUsize,
    delete_object: AtomicUsize,
    list_objects: AtomicUsize,
}

impl TransportCalls {
    pub fn authenticate(&self) -> usize {
        self.authenticate.load(Ordering::SeqCst)
    }

    pub fn head_container(&self) -> usize {
        self.head_container.load(Ordering::SeqCst)
    }

    pub fn head_object(&self) -> usize {
        self.head_object.load(Ordering::SeqCst)
    }

    pub fn get_object(&self) -> usize {
        self.get_object.load(Ordering::SeqCst)
    }

    pub fn put_object(&self) -> usize {
        self.put_object.load(Ordering::SeqCst)
    }

    pub fn delete_object(&self) -> usize {
        self.delete_object.load(Ordering::SeqCst)
    }

    pub fn list_objects(&self) -> usize {
        self.list_objects.load(Ordering::SeqCst)
    }

    /// Every operation after authentication.
    pub fn total_storage_calls(&self) -> usize {
        self.head_container()
            + self.head_object()
            + self.get_object()
            + self.put_object()
            + self.delete_object()
            + self.list_objects()
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    content_type: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: HashMap<String, HashMap<String, StoredObject>>,
    tokens_issued: u64,
    current_token: Option<String>,
}

pub struct MemoryTransport {
    username: String,
    api_key: String,
    token_ttl: chrono::Duration,
    state: Mutex<MemoryState>,
    calls: TransportCalls,
}

impl MemoryTransport {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            token_ttl: chrono::Duration::hours(1),
            state: Mutex::new(MemoryState::default()),
            calls: TransportCalls::default(),
        }
    }

    /// Pre-create a container; resolve never creates one implicitly.
    pub fn with_container(self, name: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(name.into(), HashMap::new());
        self
    }

    /// Shorten (or invert) the token lifetime to force re-authentication.
    pub fn with_token_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn calls(&self) -> &TransportCalls {
        &self.calls
    }

    /// Direct object insertion for test setup, bypassing the counters.
    pub fn seed_object(&self, container: &str, name: &str, data: &[u8], content_type: &str) {
        let mut state = self.state.lock().unwrap();
        let objects = state
            .containers
            .entry(container.to_string())
            .or_default();
        objects.insert(
            name.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                last_modified: Utc::now(),
                content_type: content_type.to_string(),
            },
        );
    }

    fn check_token(&self, state: &MemoryState, grant: &AuthGrant) -> Result<()> {
        match &state.current_token {
            Some(token) if *token == grant.token => Ok(()),
            _ => Err(StorageError::Transfer("stale or unknown token".into())),
        }
    }
}

fn info_for(name: &str, object: &StoredObject) -> ObjectInfo {
    ObjectInfo {
        name: name.to_string(),
        size: object.data.len() as u64,
        last_modified: object.last_modified,
        content_type: object.content_type.clone(),
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn authenticate(&self, username: &str, api_key: &str) -> Result<AuthGrant> {
        self.calls.authenticate.fetch_add(1, Ordering::SeqCst);

        if username != self.username || api_key != self.api_key {
            return Err(StorageError::Authentication(format!(
                "credentials rejected for user \"{}\"",
                username
            )));
        }

        let mut state = self.state.lock().unwrap();
        state.tokens_issued += 1;
        let token = format!("token-{}", state.tokens_issued);
        state.current_token = Some(token.clone());

        Ok(AuthGrant {
            token,
            storage_url: "https://storage.invalid/v1/account".to_string(),
            cdn_url: Some("https://cdn.invalid/account".to_string()),
            expires_at: Utc::now() + self.token_ttl,
        })
    }

    async fn head_container(&self, grant: &AuthGrant, container: &str) -> Result<ContainerInfo> {
        self.calls.head_container.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        self.check_token(&state, grant)?;
        let objects = state
            .containers
            .get(container)
            .ok_or_else(|| StorageError::container_not_found(container))?;

        Ok(ContainerInfo {
            name: container.to_string(),
            object_count: objects.len() as u64,
            bytes_used: objects.values().map(|o| o.data.len() as u64).sum(),
        })
    }

    async fn head_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
    ) -> Result<ObjectInfo> {
        self.calls.head_object.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        self.check_token(&state, grant)?;
        state
            .containers
            .get(container)
            .and_then(|objects| objects.get(name))
            .map(|object| info_for(name, object))
            .ok_or_else(|| StorageError::object_not_found(name))
    }

    async fn get_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
    ) -> Result<ByteStream> {
        self.calls.get_object.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        self.check_token(&state, grant)?;
        let object = state
            .containers
            .get(container)
            .and_then(|objects| objects.get(name))
            .ok_or_else(|| StorageError::object_not_found(name))?;

        let chunks: Vec<std::io::Result<Bytes>> = object
            .data
            .chunks(DOWNLOAD_CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn put_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.calls.put_object.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        self.check_token(&state, grant)?;
        let objects = state
            .containers
            .get_mut(container)
            .ok_or_else(|| StorageError::container_not_found(container))?;

        objects.insert(
            name.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, grant: &AuthGrant, container: &str, name: &str) -> Result<()> {
        self.calls.delete_object.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        self.check_token(&state, grant)?;
        let objects = state
            .containers
            .get_mut(container)
            .ok_or_else(|| StorageError::object_not_found(name))?;

        objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::object_not_found(name))
    }

    async fn list_objects(&self, grant: &AuthGrant, container: &str) -> Result<Vec<ObjectInfo>> {
        self.calls.list_objects.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        self.check_token(&state, grant)?;
        let objects = state
            .containers
            .get(container)
            .ok_or_else(|| StorageError::container_not_found(container))?;

        let mut listing: Vec<ObjectInfo> = objects
            .iter()
            .map(|(name, object)| info_for(name, object))
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authenticate_checks_credentials() {
        let transport = MemoryTransport::new("demo", "secret");

        let err = transport.authenticate("demo", "wrong").await.unwrap_err();
        assert!(matches!(err, StorageError::Authentication(_)));

        let grant = transport.authenticate("demo", "secret").await.unwrap();
        assert!(grant.token.starts_with("token-"));
        assert_eq!(transport.calls().authenticate(), 2);
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let transport = MemoryTransport::new("demo", "secret").with_container("media");
        let grant = transport.authenticate("demo", "secret").await.unwrap();

        transport
            .put_object(&grant, "media", "a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();

        let info = transport.head_object(&grant, "media", "a.txt").await.unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.content_type, "text/plain");

        let mut stream = transport.get_object(&grant, "media", "a.txt").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn test_put_into_missing_container_fails() {
        let transport = MemoryTransport::new("demo", "secret");
        let grant = transport.authenticate("demo", "secret").await.unwrap();

        let err = transport
            .put_object(&grant, "nope", "a.txt", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::NotFound { kind: crate::error::ResourceKind::Container, .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_token_is_rejected() {
        let transport = MemoryTransport::new("demo", "secret").with_container("media");
        let old = transport.authenticate("demo", "secret").await.unwrap();
        let _new = transport.authenticate("demo", "secret").await.unwrap();

        let err = transport.head_container(&old, "media").await.unwrap_err();
        assert!(matches!(err, StorageError::Transfer(_)));
    }
}
