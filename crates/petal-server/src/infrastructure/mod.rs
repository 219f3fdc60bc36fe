//! Infrastructure layer for the classification server.
//!
//! Contains OS-facing adapters: TCP sockets and threads, model backends, and
//! file-system configuration.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `petal_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod model;
pub mod network;
pub mod storage;
