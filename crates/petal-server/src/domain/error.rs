//! Error taxonomy for the classification server.
//!
//! Two families of errors exist and they are handled very differently:
//!
//! - **Per-session errors** ([`SessionError`]) describe one bad connection.
//!   They are caught at the session boundary, logged, and resolved by closing
//!   that connection only.  They never reach the listener or other sessions.
//! - **Configuration errors** ([`ConfigurationError`]) describe an
//!   inconsistent deployment (for example a label table whose length does not
//!   match the model's output).  They are detected at startup and are fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::connection::SessionState;

/// Failure raised by a classifier backend.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The tensor handed to the backend does not match its input size.
    #[error("input tensor is {actual_width}x{actual_height}, model expects {width}x{height}")]
    InputShape {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// The backend itself failed (runtime error, bad output tensor, ...).
    #[error("classifier backend failed: {0}")]
    Backend(String),
}

/// Failure while turning a decoded image into a labelled prediction.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// The backend returned a score vector of the wrong length.
    #[error("classifier returned {actual} scores, label table has {expected} rows")]
    ScoreCount { expected: usize, actual: usize },

    /// A score was NaN, so no maximum can be selected.
    #[error("score at index {index} is not a number")]
    InvalidScore { index: usize },

    /// A label lookup fell outside the table.
    #[error("label index {index} is out of range for {len} classes")]
    LabelOutOfRange { index: usize, len: usize },

    /// A previous classification panicked while holding the classifier.
    #[error("classifier is unavailable after an earlier panic")]
    Unavailable,
}

/// Coarse category of a [`SessionError`], used for counters and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionErrorKind {
    Protocol,
    ConnectionLost,
    Decode,
    Inference,
}

/// Everything that can end a session before a result is delivered.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or incomplete header, or a declared size above the limit.
    #[error("protocol error: {0}")]
    Protocol(#[from] petal_core::ProtocolError),

    /// The peer went away or the socket was shut down under the session.
    #[error("connection lost while {stage}: {source}")]
    ConnectionLost {
        stage: SessionState,
        #[source]
        source: io::Error,
    },

    /// The payload bytes are not a decodable image.
    #[error("payload is not a valid image: {0}")]
    Decode(#[from] image::ImageError),

    /// The classification capability failed.
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

impl SessionError {
    /// Builds a [`SessionError::ConnectionLost`] for a stream that hit EOF early.
    pub fn peer_closed(stage: SessionState, received: u64, expected: u64) -> Self {
        SessionError::ConnectionLost {
            stage,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {received} of {expected} bytes"),
            ),
        }
    }

    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::Protocol(_) => SessionErrorKind::Protocol,
            SessionError::ConnectionLost { .. } => SessionErrorKind::ConnectionLost,
            SessionError::Decode(_) => SessionErrorKind::Decode,
            SessionError::Inference(_) => SessionErrorKind::Inference,
        }
    }
}

/// Fatal startup error: the server cannot serve requests consistently.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The label table and the classifier disagree on the number of classes.
    #[error("label table has {labels} rows but the classifier produces {classes} scores")]
    ClassCountMismatch { labels: usize, classes: usize },

    #[error("label table is empty")]
    EmptyLabelTable,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The model file loaded but its contents are unusable.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// The configured backend was not compiled into this binary.
    #[error("classifier backend '{0}' is not available in this build")]
    BackendUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_closed_reports_progress_and_stage() {
        // Arrange / Act
        let err = SessionError::peer_closed(SessionState::ReceivingPayload, 10, 1000);

        // Assert
        assert_eq!(err.kind(), SessionErrorKind::ConnectionLost);
        let text = err.to_string();
        assert!(text.contains("receiving payload"), "got: {text}");
        assert!(text.contains("10 of 1000"), "got: {text}");
    }

    #[test]
    fn test_protocol_error_converts_and_classifies() {
        let err: SessionError = petal_core::ProtocolError::InsufficientData {
            needed: 8,
            available: 3,
        }
        .into();
        assert_eq!(err.kind(), SessionErrorKind::Protocol);
    }

    #[test]
    fn test_inference_error_wraps_classifier_error() {
        let err: SessionError =
            InferenceError::from(ClassifierError::Backend("boom".to_string())).into();
        assert_eq!(err.kind(), SessionErrorKind::Inference);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_class_count_mismatch_message_names_both_sides() {
        let err = ConfigurationError::ClassCountMismatch {
            labels: 5,
            classes: 6,
        };
        assert_eq!(
            err.to_string(),
            "label table has 5 rows but the classifier produces 6 scores"
        );
    }
}
