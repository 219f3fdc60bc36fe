//! # petal-client
//!
//! Submits one image to a petal classification server and returns the
//! server's result line.
//!
//! ```text
//! petal-client ──[8-byte length][image bytes]──► petal-server
//! petal-client ◄──"Flower classification : 장미(rose)"── (then EOF)
//! ```
//!
//! The library half ([`ClassificationClient`]) is what the `petal-client`
//! binary uses; it can be embedded in other tools the same way.

pub mod infrastructure;

pub use infrastructure::network::{ClassificationClient, ClientConfig, ClientError};
