//! cloudpail: a minimal async client core for Cloud Files style object
//! storage.
//!
//! Layered bottom-up: a pluggable [`transport::Transport`] talks to the
//! remote endpoint, [`session::SessionManager`] owns the authentication
//! lifecycle, [`container::ContainerDirectory`] resolves container handles,
//! [`object::ObjectSpace`] covers metadata and deletion, and
//! [`transfer::TransferEngine`] moves bytes. [`storage::CloudStorage`] is
//! the façade composing all of it for callers.

pub mod config;
pub mod container;
pub mod error;
pub mod object;
pub mod session;
pub mod storage;
pub mod transfer;
pub mod transport;

pub use config::StorageOptions;
pub use container::ContainerHandle;
pub use error::{ResourceKind, Result, StorageError};
pub use object::ObjectDescriptor;
pub use session::{Session, SessionManager};
pub use storage::CloudStorage;
pub use transfer::{Mode, ObjectStream, ReadStream, WriteState, WriteStream};
pub use transport::{AuthGrant, HttpTransport, MemoryTransport, Transport};
