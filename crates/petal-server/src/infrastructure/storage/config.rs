//! TOML configuration for the classification server.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! server on `127.0.0.1:8888` using the centroid model under `config/`:
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 8888
//! # max_payload_bytes = 10485760   # unlimited when absent
//!
//! [model]
//! backend = "centroid"             # or "onnx" (needs the `onnx` feature)
//! path = "config/centroids.toml"
//! labels = "config/labels.toml"
//!
//! [response]
//! prefix = "Flower classification"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Command-line flags override individual values after the file is loaded
//! (see `main.rs`).

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::application::session::SessionSettings;
use crate::domain::result::DEFAULT_RESPONSE_PREFIX;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where to listen and what to accept.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListenConfig {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest declared payload accepted; absent means unlimited.
    #[serde(default)]
    pub max_payload_bytes: Option<u64>,
}

/// Classifier backend selection.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Built-in nearest-centroid colour model.
    #[default]
    Centroid,
    /// ONNX Runtime graph.
    Onnx,
}

/// Model and label file locations.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: ModelBackend,
    /// Model file: centroid TOML or `.onnx` graph, depending on `backend`.
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Label table TOML.
    #[serde(default = "default_labels_path")]
    pub labels: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ResponseConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_model_path() -> PathBuf {
    PathBuf::from("config/centroids.toml")
}
fn default_labels_path() -> PathBuf {
    PathBuf::from("config/labels.toml")
}
fn default_prefix() -> String {
    DEFAULT_RESPONSE_PREFIX.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_payload_bytes: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            path: default_model_path(),
            labels: default_labels_path(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the config at `path`, or the defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] for file-system errors other than "not found",
    /// [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Socket address built from `bind_address` and `port`.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.server.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_payload_bytes: self.server.max_payload_bytes,
            response_prefix: self.response.prefix.clone(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
