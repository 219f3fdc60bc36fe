//! Per-connection identity and state tag.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

/// Stage of a session's lifecycle.
///
/// ```text
/// AwaitingLength ──► ReceivingPayload ──► Classifying ──► SendingResult ──► Closed
///       │                   │                  │                │
///       └───────────────────┴──────────────────┴────────────────┴──────► Closed
/// ```
///
/// `Closed` is the only terminal state and is reached on success and on
/// every error path.  No state is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the 8-byte length prefix.
    AwaitingLength,
    /// Accumulating payload bytes until the declared size is reached.
    ReceivingPayload,
    /// Decoding the image and running the classifier.
    Classifying,
    /// Writing the result line back to the peer.
    SendingResult,
    /// Socket shut down and connection deregistered.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingLength => "awaiting length",
            SessionState::ReceivingPayload => "receiving payload",
            SessionState::Classifying => "classifying",
            SessionState::SendingResult => "sending result",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Identity of one accepted connection, used in every log line it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub peer: SocketAddr,
}

impl ConnectionInfo {
    /// Creates an identity with a fresh random session id.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
        }
    }
}
