//! Live (not yet serialized) wire payloads.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

/// Failure to materialize a deferred byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to read deferred payload bytes: {message}")]
pub struct BlobReadError {
    message: String,
}

impl BlobReadError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Source of a deferred byte buffer whose contents are only known after an
/// asynchronous read.
pub trait BlobSource: fmt::Debug + Send + Sync {
    /// Byte length, known up front.
    fn size(&self) -> usize;

    fn read(&self) -> BoxFuture<'static, Result<Vec<u8>, BlobReadError>>;
}

#[derive(Debug)]
struct InlineBlob {
    bytes: Arc<[u8]>,
}

impl BlobSource for InlineBlob {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self) -> BoxFuture<'static, Result<Vec<u8>, BlobReadError>> {
        future::ready(Ok(self.bytes.to_vec())).boxed()
    }
}

/// Deferred byte buffer.
#[derive(Debug, Clone)]
pub struct Blob {
    source: Arc<dyn BlobSource>,
}

impl Blob {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::from_source(Arc::new(InlineBlob {
            bytes: bytes.into(),
        }))
    }

    #[must_use]
    pub fn from_source(source: Arc<dyn BlobSource>) -> Self {
        Self { source }
    }

    pub fn size(&self) -> usize {
        self.source.size()
    }

    pub async fn bytes(&self) -> Result<Vec<u8>, BlobReadError> {
        self.source.read().await
    }
}

/// A window into a shared byte buffer.
#[derive(Debug, Clone)]
pub struct ByteView {
    buffer: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl ByteView {
    /// Returns `None` when the window does not fit inside `buffer`.
    #[must_use]
    pub fn new(buffer: impl Into<Arc<[u8]>>, offset: usize, len: usize) -> Option<Self> {
        let buffer = buffer.into();
        let end = offset.checked_add(len)?;
        if end > buffer.len() {
            return None;
        }

        Some(Self {
            buffer,
            offset,
            len,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.len]
    }
}

/// One payload as it crosses a transport.
#[derive(Debug, Clone)]
pub enum WirePayload {
    Text(String),
    /// Fixed-length byte buffer.
    Buffer(Vec<u8>),
    View(ByteView),
    Blob(Blob),
}

impl WirePayload {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn buffer(value: impl Into<Vec<u8>>) -> Self {
        Self::Buffer(value.into())
    }

    pub fn is_binary(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Bytes available without suspending; `None` for text and blobs.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer(bytes) => Some(bytes),
            Self::View(view) => Some(view.as_bytes()),
            Self::Text(_) | Self::Blob(_) => None,
        }
    }
}

impl PartialEq for WirePayload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Blob(left), Self::Blob(right)) => Arc::ptr_eq(&left.source, &right.source),
            (Self::Blob(_), _) | (_, Self::Blob(_)) => false,
            _ => self.as_bytes() == other.as_bytes(),
        }
    }
}

impl From<&str> for WirePayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for WirePayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for WirePayload {
    fn from(value: Vec<u8>) -> Self {
        Self::Buffer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_view_rejects_out_of_bounds_windows() {
        assert!(ByteView::new(vec![1, 2, 3], 1, 2).is_some());
        assert!(ByteView::new(vec![1, 2, 3], 2, 2).is_none());
        assert!(ByteView::new(vec![1, 2, 3], usize::MAX, 2).is_none());
    }

    #[test]
    fn views_and_buffers_with_same_bytes_compare_equal() {
        let view = ByteView::new(vec![9, 1, 2, 9], 1, 2).expect("window fits");
        assert_eq!(WirePayload::View(view), WirePayload::buffer(vec![1, 2]));
        assert_ne!(WirePayload::text("12"), WirePayload::buffer(b"12".to_vec()));
    }

    #[test]
    fn blobs_compare_by_identity() {
        let blob = Blob::from_bytes(vec![1, 2]);
        assert_eq!(WirePayload::Blob(blob.clone()), WirePayload::Blob(blob));
        assert_ne!(
            WirePayload::Blob(Blob::from_bytes(vec![1, 2])),
            WirePayload::buffer(vec![1, 2])
        );
    }
}
