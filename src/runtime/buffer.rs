//! Outbound byte buffer drained one chunk at a time.
//!
//! The buffer always stores raw bytes. Text is encoded on the way in using
//! the configured encoding, and decoded only for inspection. The write path
//! pulls at most `buffer_size` bytes per call, so a large payload leaves the
//! process across several readiness events instead of one blocking send.

use crate::encoding::Encoding;
use crate::error::Result;
use bytes::{Buf, Bytes, BytesMut};

/// Value accepted by [`Buffer::append`].
///
/// `None` clears whatever is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    None,
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::None, Into::into)
    }
}

/// Pending outbound data for one socket role.
#[derive(Debug)]
pub struct Buffer {
    data: BytesMut,
    buffer_size: usize,
    encoding: Encoding,
}

impl Buffer {
    /// Create an empty buffer yielding chunks of at most `buffer_size` bytes.
    pub fn new(buffer_size: usize, encoding: Encoding) -> Self {
        debug_assert!(buffer_size > 0, "buffer size must be positive");
        Self {
            data: BytesMut::new(),
            buffer_size,
            encoding,
        }
    }

    /// Append text or bytes after the pending content, or clear it on `None`.
    ///
    /// Text that the configured encoding cannot represent is rejected and
    /// the buffer is left untouched.
    pub fn append(&mut self, value: impl Into<Payload>) -> Result<()> {
        match value.into() {
            Payload::Text(text) => {
                let encoded = self.encoding.encode(&text)?;
                self.data.extend_from_slice(&encoded);
            }
            Payload::Bytes(bytes) => self.data.extend_from_slice(&bytes),
            Payload::None => self.data.clear(),
        }
        Ok(())
    }

    /// Remove and return up to `buffer_size` bytes from the front.
    ///
    /// Returns `None` when nothing is pending.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        if self.data.is_empty() {
            return None;
        }
        let take = self.buffer_size.min(self.data.len());
        Some(self.data.split_to(take).freeze())
    }

    /// Borrow the next chunk without removing it.
    ///
    /// Pair with [`Buffer::consume`] once the number of bytes actually sent
    /// is known, so a short send leaves the rest in place.
    pub fn peek_chunk(&self) -> Option<&[u8]> {
        if self.data.is_empty() {
            return None;
        }
        let take = self.buffer_size.min(self.data.len());
        Some(&self.data[..take])
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.data.advance(n.min(self.data.len()));
    }

    /// Remaining content decoded as text, without consuming it.
    pub fn peek_decoded(&self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.encoding.decode(&self.data).into_owned())
        }
    }

    /// Drop all pending content.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Number of pending bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum chunk size.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}
