//! Streamed transfer engine: read and write streams over the transport.
//!
//! Downloads are a single forward pass; "seeking" is a reset-and-replay that
//! re-issues the GET. Uploads buffer locally and commit in exactly one store
//! call when the stream is closed, so an abandoned stream never leaves a
//! partial object behind.

use bytes::{Bytes, BytesMut};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::io::StreamReader;

use crate::container::ContainerHandle;
use crate::error::{Result, StorageError};
use crate::object::ObjectDescriptor;
use crate::session::SessionManager;
use crate::transport::{ByteStream, Transport};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Open mode for [`ObjectStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// Creates read and write streams bound to one container and session.
pub struct TransferEngine {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
}

impl TransferEngine {
    pub fn new(transport: Arc<dyn Transport>, sessions: Arc<SessionManager>) -> Self {
        Self { transport, sessions }
    }

    /// Start a download for an already resolved object.
    pub async fn open_read(
        &self,
        container: &ContainerHandle,
        descriptor: ObjectDescriptor,
    ) -> Result<ReadStream> {
        let session = self.sessions.ensure_valid().await?;
        let stream = self
            .transport
            .get_object(session.grant(), container.name(), descriptor.name())
            .await?;

        Ok(ReadStream {
            transport: self.transport.clone(),
            sessions: self.sessions.clone(),
            container: container.clone(),
            descriptor,
            reader: StreamReader::new(stream),
        })
    }

    /// Hand out a write stream. No network call happens here; the store
    /// request is deferred until `close` on a dirty stream.
    pub fn open_write(&self, container: &ContainerHandle, name: &str) -> WriteStream {
        WriteStream {
            transport: self.transport.clone(),
            sessions: self.sessions.clone(),
            container: container.clone(),
            name: name.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            buffer: BytesMut::new(),
            state: WriteState::Open,
        }
    }
}

/// One-shot download stream for a single object.
pub struct ReadStream {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
    container: ContainerHandle,
    descriptor: ObjectDescriptor,
    reader: StreamReader<ByteStream, Bytes>,
}

impl ReadStream {
    pub fn descriptor(&self) -> &ObjectDescriptor {
        &self.descriptor
    }

    pub fn size(&self) -> u64 {
        self.descriptor.size()
    }

    /// Reset-and-replay: drop the current pass and re-issue the download
    /// from the start. The underlying transfer has no true seek.
    pub async fn rewind(&mut self) -> Result<()> {
        let session = self.sessions.ensure_valid().await?;
        let stream = self
            .transport
            .get_object(
                session.grant(),
                self.container.name(),
                self.descriptor.name(),
            )
            .await?;
        self.reader = StreamReader::new(stream);
        Ok(())
    }

    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        AsyncReadExt::read_to_end(self, out)
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))
    }
}

impl AsyncRead for ReadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

/// Where a write stream is in its life cycle.
///
/// `Open → Written → Committed` is the dirty path; `Open → Closed` is a
/// stream that was never written to and therefore never touches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Open,
    Written,
    Committed,
    Closed,
}

/// Buffered upload stream committing exactly once on close.
pub struct WriteStream {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
    container: ContainerHandle,
    name: String,
    content_type: String,
    buffer: BytesMut,
    state: WriteState,
}

impl WriteStream {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    /// Bytes buffered so far (nothing has gone over the wire yet).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.state == WriteState::Written
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Append bytes to the local buffer. An empty write still marks the
    /// stream dirty, so `save` of empty content commits an empty object.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match self.state {
            WriteState::Open | WriteState::Written => {
                self.buffer.extend_from_slice(data);
                self.state = WriteState::Written;
                Ok(())
            }
            WriteState::Committed | WriteState::Closed => Err(StorageError::ClosedStream),
        }
    }

    /// Commit the buffered bytes in a single store call, or do nothing when
    /// the stream was never written to. Idempotent: closing twice neither
    /// errors nor stores twice. On commit failure the stream stays dirty and
    /// the remote object keeps its prior state, so the caller may retry.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            WriteState::Open => {
                self.state = WriteState::Closed;
                Ok(())
            }
            WriteState::Written => {
                let session = self.sessions.ensure_valid().await?;
                let body = self.buffer.clone().freeze();
                self.transport
                    .put_object(
                        session.grant(),
                        self.container.name(),
                        &self.name,
                        body,
                        &self.content_type,
                    )
                    .await?;

                self.buffer.clear();
                self.state = WriteState::Committed;
                tracing::debug!(
                    "object \"{}\" committed to container \"{}\"",
                    self.name,
                    self.container.name()
                );
                Ok(())
            }
            WriteState::Committed | WriteState::Closed => Ok(()),
        }
    }
}

/// A stream handed out by the façade's mode-dispatching `open`.
pub enum ObjectStream {
    Read(ReadStream),
    Write(WriteStream),
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectStream::Read(_) => f.write_str("ObjectStream::Read"),
            ObjectStream::Write(_) => f.write_str("ObjectStream::Write"),
        }
    }
}

impl ObjectStream {
    pub fn mode(&self) -> Mode {
        match self {
            ObjectStream::Read(_) => Mode::Read,
            ObjectStream::Write(_) => Mode::Write,
        }
    }

    /// Metadata is only known for read streams; a write stream may name an
    /// object that does not exist yet.
    pub fn descriptor(&self) -> Option<&ObjectDescriptor> {
        match self {
            ObjectStream::Read(stream) => Some(stream.descriptor()),
            ObjectStream::Write(_) => None,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            ObjectStream::Read(_) => Err(StorageError::InvalidMode("writing")),
            ObjectStream::Write(stream) => stream.write(data),
        }
    }

    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        match self {
            ObjectStream::Read(stream) => stream.read_to_end(out).await,
            ObjectStream::Write(_) => Err(StorageError::InvalidMode("reading")),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match self {
            ObjectStream::Read(_) => Ok(()),
            ObjectStream::Write(stream) => stream.close().await,
        }
    }

    pub fn as_read(&mut self) -> Option<&mut ReadStream> {
        match self {
            ObjectStream::Read(stream) => Some(stream),
            ObjectStream::Write(_) => None,
        }
    }

    pub fn as_write(&mut self) -> Option<&mut WriteStream> {
        match self {
            ObjectStream::Write(stream) => Some(stream),
            ObjectStream::Read(_) => None,
        }
    }
}
