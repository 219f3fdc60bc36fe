//! Application layer use cases for the classification server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the domain types (pure data and rules)
//! and the infrastructure (sockets, files, model runtimes).  Code here:
//!
//! - **Orchestrates** domain objects to serve one request.
//! - **Depends on traits** ([`inference::Classifier`],
//!   [`session::SessionStream`]) rather than concrete sockets or runtimes, so
//!   it can be unit-tested with in-memory fakes.
//!
//! # Sub-modules
//!
//! - **`inference`** – Preprocesses a decoded image, runs the classifier
//!   under a lock, and maps the highest score to a label.
//! - **`session`**   – The per-connection state machine: read the length
//!   prefix, read the payload, classify, write the result, close.

pub mod inference;
pub mod session;
