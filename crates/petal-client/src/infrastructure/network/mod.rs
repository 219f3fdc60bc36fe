//! Network infrastructure for the client application.
//!
//! One request per connection:
//!
//! 1. Connect to the server.
//! 2. Send the 8-byte big-endian length, then the image in chunks of at most
//!    [`CHUNK_SIZE`] bytes.
//! 3. Read until the server closes the connection; everything read is the
//!    UTF-8 result.
//!
//! Errors are reported to the caller as-is.  Nothing is retried: a failed
//! classification is cheaper to resubmit by hand than to guess about.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use std::time::Duration;

use petal_core::{encode_length, CHUNK_SIZE};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time,
};
use tracing::{debug, info};

/// Errors that can occur while submitting an image.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The image file could not be read.
    #[error("failed to read image {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server did not finish in time.
    #[error("timed out after {after:?} while {stage}")]
    Timeout {
        stage: &'static str,
        after: Duration,
    },

    /// The server closed the connection without sending a result.
    ///
    /// This is how the server reports a payload it could not decode or
    /// classify.
    #[error("server closed the connection without a result")]
    EmptyResponse,

    #[error("server response is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// Configuration for the client's connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the complete result after sending.
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Submits images to one server.
#[derive(Debug, Clone)]
pub struct ClassificationClient {
    config: ClientConfig,
}

impl ClassificationClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Reads the image at `path` and submits it.
    pub async fn submit_file(&self, path: &Path) -> Result<String, ClientError> {
        let payload = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), bytes = payload.len(), "image loaded");
        self.submit(&payload).await
    }

    /// Sends `payload` as one request and returns the server's result line.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectFailed`] / [`ClientError::Timeout`] if the
    ///   server cannot be reached.
    /// - [`ClientError::Io`] if the connection breaks mid-transfer.
    /// - [`ClientError::EmptyResponse`] if the server hangs up without a
    ///   result.
    pub async fn submit(&self, payload: &[u8]) -> Result<String, ClientError> {
        let addr = self.config.server_addr;
        let mut stream = time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout {
                stage: "connecting",
                after: self.config.connect_timeout,
            })?
            .map_err(|source| ClientError::ConnectFailed { addr, source })?;
        info!(%addr, "connected to server");

        stream
            .write_all(&encode_length(payload.len() as u64))
            .await?;
        for chunk in payload.chunks(CHUNK_SIZE) {
            stream.write_all(chunk).await?;
        }
        stream.flush().await?;
        debug!(bytes = payload.len(), "payload sent");

        let mut reply = Vec::new();
        time::timeout(self.config.read_timeout, stream.read_to_end(&mut reply))
            .await
            .map_err(|_| ClientError::Timeout {
                stage: "waiting for the result",
                after: self.config.read_timeout,
            })??;

        if reply.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        let result = String::from_utf8(reply)?;
        info!(%result, "result received");
        Ok(result)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
