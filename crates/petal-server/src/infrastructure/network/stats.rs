//! Counters of how sessions ended.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::error::{SessionError, SessionErrorKind};

/// Per-server session outcome counters, updated by every session thread.
#[derive(Debug, Default)]
pub struct ServerStats {
    completed: AtomicU64,
    protocol: AtomicU64,
    connection_lost: AtomicU64,
    decode: AtomicU64,
    inference: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub protocol: u64,
    pub connection_lost: u64,
    pub decode: u64,
    pub inference: u64,
}

impl StatsSnapshot {
    pub fn failed(&self) -> u64 {
        self.protocol + self.connection_lost + self.decode + self.inference
    }
}

impl ServerStats {
    pub fn record<T>(&self, outcome: &Result<T, SessionError>) {
        let counter = match outcome {
            Ok(_) => &self.completed,
            Err(e) => match e.kind() {
                SessionErrorKind::Protocol => &self.protocol,
                SessionErrorKind::ConnectionLost => &self.connection_lost,
                SessionErrorKind::Decode => &self.decode,
                SessionErrorKind::Inference => &self.inference,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            protocol: self.protocol.load(Ordering::Relaxed),
            connection_lost: self.connection_lost.load(Ordering::Relaxed),
            decode: self.decode.load(Ordering::Relaxed),
            inference: self.inference.load(Ordering::Relaxed),
        }
    }
}
