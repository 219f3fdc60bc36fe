//! # petal-core
//!
//! Shared library for petal containing the wire protocol used between the
//! classification server and its clients.
//!
//! This crate is used by both the server and the client applications.
//! It has zero dependencies on OS APIs, image libraries, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! petal lets a remote caller send an image over a plain TCP connection and
//! get back the name of whatever the server's classifier thinks is in it.
//! The exchange is a single request/response per connection:
//!
//! ```text
//! Client                                   Server
//! ──────                                   ──────
//! [length: 8 bytes, big-endian u64]  ──►
//! [image bytes: exactly `length`]    ──►
//!                                    ◄──   "Flower classification : 장미(rose)"
//!                                    ◄──   (connection closed)
//! ```
//!
//! - **`protocol`** – How bytes travel over the network.  The request is
//!   framed with an 8-byte length prefix; the response is raw UTF-8 text
//!   terminated by the server closing the socket.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `petal_core::encode_length` instead of `petal_core::protocol::codec::encode_length`.
pub use protocol::codec::{
    check_declared_length, decode_length, decode_length_prefix, encode_frame, encode_length, ProtocolError,
    CHUNK_SIZE, LENGTH_PREFIX_SIZE,
};
