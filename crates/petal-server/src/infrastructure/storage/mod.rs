//! Storage infrastructure: configuration and label files on disk.
//!
//! - **`config`** – The server's TOML configuration file.
//! - [`load_label_table`] – Reads the `[[class]]` label file named by the
//!   configuration.

pub mod config;

use std::path::Path;

use tracing::info;

use crate::domain::error::ConfigurationError;
use crate::domain::labels::LabelTable;

/// Reads and parses the label table at `path`.
///
/// # Errors
///
/// [`ConfigurationError::Io`] if the file cannot be read, otherwise whatever
/// [`LabelTable::from_toml_str`] reports.
pub fn load_label_table(path: &Path) -> Result<LabelTable, ConfigurationError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = LabelTable::from_toml_str(&text, path)?;
    info!(classes = table.len(), path = %path.display(), "loaded label table");
    Ok(table)
}
