//! petal classification server entry point.
//!
//! Listens for raw TCP connections, reads one length-prefixed image from
//! each, classifies it and writes back a single UTF-8 result line.
//!
//! # Usage
//!
//! ```text
//! petal-server [OPTIONS]
//!
//! Options:
//!   --config <FILE>             TOML config file [default: petal.toml]
//!   --bind <IP>                 Bind address (overrides [server].bind_address)
//!   --port <PORT>               Listen port (overrides [server].port)
//!   --backend <centroid|onnx>   Classifier backend (overrides [model].backend)
//!   --model <FILE>              Model file (overrides [model].path)
//!   --labels <FILE>             Label table (overrides [model].labels)
//!   --max-payload-bytes <N>     Reject larger declared payloads
//!   --log-level <LEVEL>         Log level when RUST_LOG is unset
//! ```
//!
//! Every option can also be set through a `PETAL_*` environment variable;
//! see `--help`.  Precedence: CLI flag, then environment, then config file,
//! then built-in default.
//!
//! # Startup sequence
//!
//! 1. Parse CLI arguments and load the config file.
//! 2. Initialise `tracing` (`RUST_LOG` wins over the configured level).
//! 3. Load the label table and the classifier, and check that they agree on
//!    the number of classes.  A mismatch is fatal.
//! 4. Bind the listener and start accepting connections.
//! 5. On Ctrl+C, stop the server: close every live connection and join all
//!    threads before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use petal_server::application::inference::InferenceAdapter;
use petal_server::infrastructure::model::load_classifier;
use petal_server::infrastructure::network::Server;
use petal_server::infrastructure::storage::config::{ModelBackend, ServerConfig};
use petal_server::infrastructure::storage::load_label_table;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Image classification server speaking a length-prefixed TCP protocol.
#[derive(Debug, Parser)]
#[command(
    name = "petal-server",
    about = "Classifies images submitted over raw TCP",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  Missing file means defaults.
    #[arg(long, default_value = "petal.toml", env = "PETAL_CONFIG")]
    config: PathBuf,

    /// IP address to bind.
    #[arg(long, env = "PETAL_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "PETAL_PORT")]
    port: Option<u16>,

    /// Classifier backend.
    #[arg(long, value_enum, env = "PETAL_BACKEND")]
    backend: Option<ModelBackend>,

    /// Model file (centroid TOML or ONNX graph).
    #[arg(long, env = "PETAL_MODEL")]
    model: Option<PathBuf>,

    /// Label table file.
    #[arg(long, env = "PETAL_LABELS")]
    labels: Option<PathBuf>,

    /// Largest declared payload size accepted, in bytes.
    #[arg(long, env = "PETAL_MAX_PAYLOAD_BYTES")]
    max_payload_bytes: Option<u64>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "PETAL_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file and applies the CLI overrides on top of it.
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::load(&self.config)
            .with_context(|| format!("loading config from {}", self.config.display()))?;
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(limit) = self.max_payload_bytes {
            config.server.max_payload_bytes = Some(limit);
        }
        if let Some(backend) = self.backend {
            config.model.backend = backend;
        }
        if let Some(model) = self.model {
            config.model.path = model;
        }
        if let Some(labels) = self.labels {
            config.model.labels = labels;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let addr = config.listen_addr().context("invalid listen address")?;

    let labels = load_label_table(&config.model.labels).context("loading label table")?;
    let classifier = load_classifier(&config.model).context("loading classifier")?;
    let adapter = InferenceAdapter::new(classifier, labels)
        .context("classifier and label table are inconsistent")?;

    let server = Arc::new(
        Server::start(addr, Arc::new(adapter), config.session_settings())
            .context("starting server")?,
    );
    info!(addr = %server.local_addr(), "petal server ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    info!("received Ctrl+C, initiating graceful shutdown");

    // stop() joins OS threads, so keep it off the async runtime.
    let stopping = Arc::clone(&server);
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("shutdown task failed")?;

    let stats = server.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed(),
        protocol = stats.protocol,
        connection_lost = stats.connection_lost,
        decode = stats.decode,
        inference = stats.inference,
        "petal server stopped"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_keep_config_values() {
        // Arrange
        let cli = Cli::parse_from(["petal-server", "--config", "/nonexistent/petal.toml"]);

        // Act
        let config = cli.into_config().unwrap();

        // Assert
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "petal-server",
            "--config",
            "/nonexistent/petal.toml",
            "--port",
            "9100",
            "--bind",
            "0.0.0.0",
            "--backend",
            "onnx",
            "--max-payload-bytes",
            "4096",
        ]);

        let config = cli.into_config().unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.model.backend, ModelBackend::Onnx);
        assert_eq!(config.server.max_payload_bytes, Some(4096));
    }
}
