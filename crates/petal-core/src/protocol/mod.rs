//! Protocol module containing the length-prefix codec.

pub mod codec;

pub use codec::{
    check_declared_length, decode_length, decode_length_prefix, encode_frame, encode_length, ProtocolError,
    CHUNK_SIZE, LENGTH_PREFIX_SIZE,
};
