//! Domain types for the classification server.
//!
//! Nothing in here touches a socket, a file, or a model backend.  The
//! application layer builds on these types and the infrastructure layer
//! produces and consumes them.

pub mod connection;
pub mod error;
pub mod labels;
pub mod payload;
pub mod result;

pub use connection::{ConnectionInfo, SessionState};
pub use error::{
    ClassifierError, ConfigurationError, InferenceError, SessionError, SessionErrorKind,
};
pub use labels::{LabelEntry, LabelTable};
pub use payload::ImagePayload;
pub use result::ClassificationResult;
