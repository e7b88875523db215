//! Growable byte sink for streamed library output.

use bytes::{Bytes, BytesMut};
use std::io::{self, Write};

/// Accumulates the blocks a library writes during serialization into one
/// contiguous buffer.
#[derive(Debug)]
pub struct BufferWriter {
    inner: BytesMut,
    blocks: usize,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::with_capacity(64 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
            blocks: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of write calls received so far.
    pub const fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn into_bytes(self) -> Bytes {
        self.inner.freeze()
    }
}

impl Default for BufferWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.extend_from_slice(buf);
        self.blocks += 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_concatenated() {
        let mut sink = BufferWriter::with_capacity(4);
        sink.write_all(b"%PDF-").unwrap();
        sink.write_all(b"1.7\n").unwrap();
        sink.write_all(b"").unwrap();
        assert_eq!(sink.as_slice(), b"%PDF-1.7\n");
        assert_eq!(sink.len(), 9);
        assert_eq!(sink.into_bytes(), Bytes::from_static(b"%PDF-1.7\n"));
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut sink = BufferWriter::with_capacity(1);
        let block = vec![7u8; 10_000];
        for _ in 0..3 {
            sink.write_all(&block).unwrap();
        }
        assert_eq!(sink.len(), 30_000);
        assert_eq!(sink.blocks(), 3);
    }

    #[test]
    fn test_new_is_empty() {
        let sink = BufferWriter::default();
        assert!(sink.is_empty());
        assert_eq!(sink.blocks(), 0);
    }
}
