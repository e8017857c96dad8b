//! Error taxonomy for all storage operations.

use thiserror::Error;

/// Which kind of remote resource a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Container,
    Object,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Container => write!(f, "container"),
            ResourceKind::Object => write!(f, "object"),
        }
    }
}

/// Errors surfaced by the storage client.
///
/// Configuration problems are reported at construction time and always name
/// the offending option. Credential rejection is kept separate from transport
/// failures so callers can tell "fix your key" apart from "retry later".
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("no such {kind} \"{name}\"")]
    NotFound { kind: ResourceKind, name: String },

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("stream is closed")]
    ClosedStream,

    #[error("stream not open for {0}")]
    InvalidMode(&'static str),
}

impl StorageError {
    pub fn container_not_found(name: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind: ResourceKind::Container,
            name: name.into(),
        }
    }

    pub fn object_not_found(name: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind: ResourceKind::Object,
            name: name.into(),
        }
    }

    /// True for any absence error, container or object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Transfer(format!("request timed out: {}", err))
        } else {
            StorageError::Transfer(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
