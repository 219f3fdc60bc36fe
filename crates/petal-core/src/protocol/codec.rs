//! Length-prefix codec for the petal request leg.
//!
//! Wire format (client → server):
//! ```text
//! [payload_len:8][payload:N]
//! ```
//! `payload_len` is an unsigned 64-bit big-endian integer equal to `N`.
//! There is no version byte, type tag, or checksum.
//!
//! The response leg (server → client) carries no prefix at all: the server
//! writes the UTF-8 result and closes the connection.

use thiserror::Error;

/// Size in bytes of the length prefix that precedes every request payload.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Upper bound on a single payload read or write.
///
/// Both sides move the payload in chunks of at most this many bytes.
pub const CHUNK_SIZE: usize = 1024;

/// Errors that can occur while decoding or validating a length prefix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the length prefix.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The declared payload length exceeds what the receiver accepts.
    #[error("declared payload of {declared} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { declared: u64, limit: u64 },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a payload length as the 8-byte big-endian prefix.
///
/// # Examples
///
/// ```rust
/// use petal_core::{decode_length, encode_length};
///
/// let prefix = encode_length(82_340);
/// assert_eq!(prefix, [0, 0, 0, 0, 0, 0x01, 0x41, 0xA4]);
/// assert_eq!(decode_length(prefix), 82_340);
/// ```
pub fn encode_length(n: u64) -> [u8; LENGTH_PREFIX_SIZE] {
    n.to_be_bytes()
}

/// Decodes an 8-byte big-endian prefix back into a payload length.
///
/// This is the exact inverse of [`encode_length`] for every `u64`.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> u64 {
    u64::from_be_bytes(prefix)
}

/// Decodes the length prefix at the beginning of `bytes`.
///
/// Any bytes after the first [`LENGTH_PREFIX_SIZE`] are ignored, so the
/// caller can pass a buffer that already holds part of the payload.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 8 bytes are
/// available.
pub fn decode_length_prefix(bytes: &[u8]) -> Result<u64, ProtocolError> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = bytes
        .get(..LENGTH_PREFIX_SIZE)
        .and_then(|head| head.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            needed: LENGTH_PREFIX_SIZE,
            available: bytes.len(),
        })?;
    Ok(decode_length(prefix))
}

/// Validates a decoded payload length against an optional receiver limit.
///
/// `None` means unlimited, which is what the wire protocol itself specifies.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if `declared` exceeds `limit`.
pub fn check_declared_length(declared: u64, limit: Option<u64>) -> Result<u64, ProtocolError> {
    match limit {
        Some(limit) if declared > limit => Err(ProtocolError::PayloadTooLarge { declared, limit }),
        _ => Ok(declared),
    }
}

/// Builds a complete request frame: the length prefix followed by `payload`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&encode_length(payload.len() as u64));
    buf.extend_from_slice(payload);
    buf
}

// ── Tests ─────────────────────────────────────────────────────────────────────
