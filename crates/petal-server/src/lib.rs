//! petal-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Layout
//!
//! ```text
//! domain/          Pure types: errors, label table, payload, result
//! application/     Session state machine and the inference adapter
//! infrastructure/
//!   network/       Listener, connection registry, server lifecycle
//!   model/         Classifier backends (centroid, ONNX)
//!   storage/       TOML configuration and label files
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
