//! Growable byte buffer with geometric capacity growth.
//!
//! Used for accumulating partial client messages and building framed
//! output before it reaches a socket.

/// A mutable byte sequence that grows geometrically.
///
/// Capacity is always a power-of-two multiple of the initial block, so
/// repeated appends amortize to O(1).
#[derive(Debug, Default)]
pub struct DynBuf {
    data: Vec<u8>,
}

const INITIAL_CAPACITY: usize = 256;

impl DynBuf {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.reserve_for(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    pub fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    pub fn push_char(&mut self, c: char) {
        let mut tmp = [0u8; 4];
        self.push_bytes(c.encode_utf8(&mut tmp).as_bytes());
    }

    /// Truncates the buffer to `len` bytes (no-op if already shorter).
    pub fn set_len(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Drops the first `count` bytes, keeping the rest.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.data.len());
        self.data.drain(..count);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Consumes the buffer and returns the owned bytes.
    pub fn freeze(self) -> Vec<u8> {
        self.data
    }

    /// Consumes the buffer and returns a string, replacing invalid
    /// UTF-8 sequences.
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    fn reserve_for(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let mut new_capacity = self.data.capacity().max(INITIAL_CAPACITY);
        while new_capacity < needed {
            new_capacity *= 2;
        }
        self.data.reserve_exact(new_capacity - self.data.len());
    }
}

impl std::io::Write for DynBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.push_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
