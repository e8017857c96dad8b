//! Storage façade: the one public entry point composing sessions,
//! container resolution, the object address space and the transfer engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::StorageOptions;
use crate::container::{ContainerDirectory, ContainerHandle};
use crate::error::{ResourceKind, Result, StorageError};
use crate::object::{ObjectDescriptor, ObjectSpace};
use crate::session::SessionManager;
use crate::transfer::{Mode, ObjectStream, TransferEngine};
use crate::transport::{HttpTransport, Transport};

/// A storage backend bound to one account, region and container.
///
/// Construction is fail-fast: options are validated, the account is
/// authenticated and the configured container resolved before `new`
/// returns. Each instance owns its session; two instances in one process
/// are fully independent.
pub struct CloudStorage {
    options: StorageOptions,
    sessions: Arc<SessionManager>,
    directory: ContainerDirectory,
    objects: ObjectSpace,
    engine: TransferEngine,
    container: ContainerHandle,
}

impl std::fmt::Debug for CloudStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStorage").finish_non_exhaustive()
    }
}

impl CloudStorage {
    pub async fn new(options: StorageOptions, transport: Arc<dyn Transport>) -> Result<Self> {
        options.validate()?;

        let sessions = Arc::new(SessionManager::new(transport.clone(), &options));
        sessions.authenticate().await?;

        let directory =
            ContainerDirectory::new(transport.clone(), sessions.clone(), options.public);

        // An absent container at construction time is a configuration
        // problem, not a runtime lookup miss.
        let container = directory
            .resolve(&options.container)
            .await
            .map_err(|err| match err {
                StorageError::NotFound { kind: ResourceKind::Container, name } => {
                    StorageError::Config(format!("no such container \"{}\"", name))
                }
                other => other,
            })?;

        let objects = ObjectSpace::new(transport.clone(), sessions.clone());
        let engine = TransferEngine::new(transport, sessions.clone());

        tracing::info!(
            "storage backend ready: container \"{}\" in region {}",
            container.name(),
            options.region
        );

        Ok(Self {
            options,
            sessions,
            directory,
            objects,
            engine,
            container,
        })
    }

    /// Construct from a JSON options map with the recognized keys
    /// `USERNAME`, `API_KEY`, `REGION`, `CONTAINER` and `PUBLIC`.
    pub async fn from_value(value: &Value, transport: Arc<dyn Transport>) -> Result<Self> {
        let options = StorageOptions::from_value(value)?;
        Self::new(options, transport).await
    }

    /// Connect over HTTP against the given identity endpoint. The transport
    /// is built from the options, so the configured timeout bounds every
    /// request it issues.
    pub async fn connect(options: StorageOptions, auth_url: &str) -> Result<Self> {
        options.validate()?;
        let transport = Arc::new(HttpTransport::from_options(auth_url, &options)?);
        Self::new(options, transport).await
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    /// Current handle for the configured container, re-resolved (from cache
    /// when possible) so it is never bound to a replaced session.
    async fn current_container(&self) -> Result<ContainerHandle> {
        self.directory.resolve(&self.options.container).await
    }

    /// Open an object for reading or writing.
    ///
    /// Read mode stats the object first and fails with `NotFound` when it is
    /// absent. Write mode performs no network call until the stream commits.
    pub async fn open(&self, name: &str, mode: Mode) -> Result<ObjectStream> {
        let container = self.current_container().await?;
        match mode {
            Mode::Read => {
                let descriptor = self.objects.stat(&container, name).await?;
                let stream = self.engine.open_read(&container, descriptor).await?;
                Ok(ObjectStream::Read(stream))
            }
            Mode::Write => Ok(ObjectStream::Write(self.engine.open_write(&container, name))),
        }
    }

    /// Store content under the given name and return the canonical name.
    pub async fn save(&self, name: &str, content: Bytes) -> Result<String> {
        let container = self.current_container().await?;
        let mut stream = self.engine.open_write(&container, name);
        stream.write(&content)?;
        stream.close().await?;
        tracing::debug!("saved \"{}\" ({} bytes)", name, content.len());
        Ok(name.to_string())
    }

    /// Drain a byte source and store it under the given name.
    pub async fn save_reader<R>(&self, name: &str, mut reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;
        self.save(name, Bytes::from(content)).await
    }

    /// Delete the named object. Deleting an object that is already absent is
    /// a no-op, so delete is idempotent.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let container = self.current_container().await?;
        match self.objects.delete(&container, name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                tracing::debug!("delete of absent object \"{}\" ignored", name);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Whether an object with this name exists. Absence of the object (or of
    /// the container itself) is `false`, never an error.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let container = match self.current_container().await {
            Ok(container) => container,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };
        self.objects.exists(&container, name).await
    }

    pub async fn stat(&self, name: &str) -> Result<ObjectDescriptor> {
        let container = self.current_container().await?;
        self.objects.stat(&container, name).await
    }

    /// Size of the named object in bytes.
    pub async fn size(&self, name: &str) -> Result<u64> {
        Ok(self.stat(name).await?.size())
    }

    pub async fn last_modified(&self, name: &str) -> Result<DateTime<Utc>> {
        Ok(self.stat(name).await?.last_modified())
    }

    /// All objects in the configured container.
    pub async fn list(&self) -> Result<Vec<ObjectDescriptor>> {
        let container = self.current_container().await?;
        self.objects.list(&container).await
    }

    /// Public URL for the named object: the container's public base and the
    /// name, slash-joined. Pure construction; never touches the network.
    pub fn url(&self, name: &str) -> String {
        format!("{}/{}", self.container.public_url(), name)
    }

    /// Generation of the live session, if any. Exposed for diagnostics.
    pub async fn session_generation(&self) -> Option<u64> {
        self.sessions.current_generation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn options() -> StorageOptions {
        StorageOptions::new("demo", "secret", "ORD", "media")
    }

    fn transport() -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport::new("demo", "secret").with_container("media"))
    }

    async fn storage() -> (Arc<MemoryTransport>, CloudStorage) {
        let transport = transport();
        let storage = CloudStorage::new(options(), transport.clone()).await.unwrap();
        (transport, storage)
    }

    #[tokio::test]
    async fn test_construction_validates_options() {
        let mut bad = options();
        bad.api_key = String::new();
        let err = CloudStorage::new(bad, transport()).await.unwrap_err();
        match err {
            StorageError::Config(msg) => assert!(msg.contains("API_KEY")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_construction_rejects_bad_credentials() {
        let mut bad = options();
        bad.api_key = "wrong".into();
        let err = CloudStorage::new(bad, transport()).await.unwrap_err();
        assert!(matches!(err, StorageError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_construction_names_missing_container() {
        let transport = Arc::new(MemoryTransport::new("demo", "secret"));
        let err = CloudStorage::new(options(), transport).await.unwrap_err();
        match err {
            StorageError::Config(msg) => assert!(msg.contains("media"), "{}", msg),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_from_value_missing_key_fails_before_any_network_call() {
        let transport = transport();
        let err = CloudStorage::from_value(
            &json!({"USERNAME": "demo", "API_KEY": "secret", "REGION": "ORD"}),
            transport.clone(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("CONTAINER"));
        assert_eq!(transport.calls().authenticate(), 0);
    }

    #[tokio::test]
    async fn test_connect_validates_before_touching_the_network() {
        let mut bad = options();
        bad.region = String::new();
        let err = CloudStorage::connect(bad, "https://auth.example.test/v1.0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("REGION"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_auth_url() {
        let err = CloudStorage::connect(options(), "not a url").await.unwrap_err();
        match err {
            StorageError::Config(msg) => assert!(msg.contains("auth URL"), "{}", msg),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_open_round_trip() {
        let (_transport, storage) = storage().await;
        let content = b"some bytes with \x00 and \xff in them".to_vec();
        let name = storage.save("blob.bin", Bytes::from(content.clone())).await.unwrap();
        assert_eq!(name, "blob.bin");

        let mut stream = storage.open("blob.bin", Mode::Read).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn test_empty_round_trip() {
        let (_transport, storage) = storage().await;
        storage.save("empty", Bytes::new()).await.unwrap();

        let mut stream = storage.open("empty", Mode::Read).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(storage.size("empty").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_read_absent_object() {
        let (_transport, storage) = storage().await;
        let err = storage.open("missing.txt", Mode::Read).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_exists_lifecycle() {
        let (_transport, storage) = storage().await;
        assert!(!storage.exists("a.txt").await.unwrap());

        storage.save("a.txt", Bytes::from_static(b"hello")).await.unwrap();
        assert!(storage.exists("a.txt").await.unwrap());

        storage.delete("a.txt").await.unwrap();
        assert!(!storage.exists("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_transport, storage) = storage().await;
        storage.save("a.txt", Bytes::from_static(b"x")).await.unwrap();
        storage.delete("a.txt").await.unwrap();
        // Second delete of the now-absent object is a quiet no-op.
        storage.delete("a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_size_matches_content_length() {
        let (_transport, storage) = storage().await;
        storage.save("a.txt", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(storage.size("a.txt").await.unwrap(), 5);

        let err = storage.size("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_save_reader_drains_source() {
        let (_transport, storage) = storage().await;
        let source: &[u8] = b"streamed content";
        storage.save_reader("r.txt", source).await.unwrap();
        assert_eq!(storage.size("r.txt").await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_url_is_pure_and_stable() {
        let (transport, storage) = storage().await;
        let before = transport.calls().total_storage_calls();

        let url = storage.url("photos/cat.jpg");
        assert_eq!(url, "https://cdn.invalid/account/media/photos/cat.jpg");
        assert_eq!(storage.url("photos/cat.jpg"), url);
        assert_eq!(transport.calls().total_storage_calls(), before);
    }

    #[tokio::test]
    async fn test_private_url_uses_storage_endpoint() {
        let transport = transport();
        let storage = CloudStorage::new(options().private(), transport).await.unwrap();
        assert_eq!(
            storage.url("a.txt"),
            "https://storage.invalid/v1/account/media/a.txt"
        );
    }

    #[tokio::test]
    async fn test_opaque_names_pass_through() {
        let (_transport, storage) = storage().await;
        let name = "nested/dir/like/name.txt";
        storage.save(name, Bytes::from_static(b"deep")).await.unwrap();
        assert!(storage.exists(name).await.unwrap());

        let listing = storage.list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name(), name);
    }

    #[tokio::test]
    async fn test_save_stat_delete_scenario() {
        let (_transport, storage) = storage().await;
        let before = Utc::now();

        storage.save("a.txt", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(storage.size("a.txt").await.unwrap(), 5);
        assert!(storage.last_modified("a.txt").await.unwrap() >= before);

        storage.delete("a.txt").await.unwrap();
        assert!(!storage.exists("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_two_backends_have_independent_sessions() {
        let transport = transport();
        let a = CloudStorage::new(options(), transport.clone()).await.unwrap();
        let b = CloudStorage::new(options(), transport.clone()).await.unwrap();

        assert_eq!(a.session_generation().await, Some(0));
        assert_eq!(b.session_generation().await, Some(0));
        assert_eq!(transport.calls().authenticate(), 2);
    }
}
