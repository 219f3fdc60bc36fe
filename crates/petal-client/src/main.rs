//! petal-client: submit one image and print the classification.
//!
//! # Usage
//!
//! ```text
//! petal-client [OPTIONS] <IMAGE>
//!
//! Options:
//!   --server <ADDR>            Server address [default: 127.0.0.1:8888]
//!   --timeout <SECS>           Seconds to wait for the result [default: 10]
//!   --connect-timeout <SECS>   Seconds to wait for the connection [default: 5]
//! ```
//!
//! The result line is printed to stdout; logs go to stderr and are
//! controlled by `RUST_LOG` (default `warn`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use petal_client::{ClassificationClient, ClientConfig};

/// Sends an image to a petal server and prints its classification.
#[derive(Debug, Parser)]
#[command(
    name = "petal-client",
    about = "Submit an image to a petal classification server",
    version
)]
struct Cli {
    /// Image file to classify (JPEG or PNG).
    image: PathBuf,

    /// Address of the petal server.
    #[arg(long, default_value = "127.0.0.1:8888", env = "PETAL_SERVER")]
    server: SocketAddr,

    /// Seconds to wait for the complete result after sending.
    #[arg(long, default_value_t = 10, env = "PETAL_TIMEOUT")]
    timeout: u64,

    /// Seconds to wait for the TCP connection.
    #[arg(long, default_value_t = 5, env = "PETAL_CONNECT_TIMEOUT")]
    connect_timeout: u64,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_addr: self.server,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = ClassificationClient::new(cli.client_config());
    let result = client
        .submit_file(&cli.image)
        .await
        .with_context(|| format!("classifying {}", cli.image.display()))?;

    println!("{result}");
    Ok(())
}
