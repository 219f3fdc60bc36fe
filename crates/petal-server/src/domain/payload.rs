//! Accumulating buffer for one request payload.

/// Largest up-front allocation made on the strength of a declared size.
///
/// The declared size comes straight off the wire, so the buffer grows with
/// the bytes actually received beyond this point.
const MAX_PREALLOCATION: u64 = 1024 * 1024;

/// Declared size plus the bytes received so far.
///
/// The payload is only handed to the image decoder once
/// [`is_complete`](ImagePayload::is_complete) holds; a partial payload is
/// never decoded.
#[derive(Debug)]
pub struct ImagePayload {
    declared: u64,
    buf: Vec<u8>,
}

impl ImagePayload {
    pub fn new(declared: u64) -> Self {
        Self {
            declared,
            buf: Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize),
        }
    }

    pub fn received(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Bytes still missing before the payload is complete.
    pub fn remaining(&self) -> u64 {
        self.declared.saturating_sub(self.received())
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.declared
    }

    /// Appends received bytes.
    ///
    /// The caller never reads past the declared size, so `chunk` is at most
    /// [`remaining`](ImagePayload::remaining) bytes long.
    pub fn extend(&mut self, chunk: &[u8]) {
        debug_assert!(chunk.len() as u64 <= self.remaining());
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the full payload, or `None` while bytes are still missing.
    pub fn complete_bytes(&self) -> Option<&[u8]> {
        self.is_complete().then_some(self.buf.as_slice())
    }
}
