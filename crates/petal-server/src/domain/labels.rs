//! Label table: class index → human-readable names.
//!
//! The table is an ordered list; row `i` names the class whose score sits at
//! position `i` of the classifier's output.  It is stored on disk as TOML:
//!
//! ```toml
//! [[class]]
//! en_class = "daisy"
//! ko_class = "데이지"
//!
//! [[class]]
//! en_class = "rose"
//! ko_class = "장미"
//! ```

use serde::Deserialize;

use crate::domain::error::ConfigurationError;

/// One row of the label table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelEntry {
    /// English class name.
    pub en_class: String,
    /// Korean class name.
    pub ko_class: String,
}

impl LabelEntry {
    pub fn new(en_class: impl Into<String>, ko_class: impl Into<String>) -> Self {
        Self {
            en_class: en_class.into(),
            ko_class: ko_class.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelFile {
    #[serde(default, rename = "class")]
    classes: Vec<LabelEntry>,
}

/// Immutable, non-empty ordered label table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    entries: Vec<LabelEntry>,
}

impl LabelTable {
    /// Builds a table from rows in class-index order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyLabelTable`] if `entries` is empty.
    pub fn new(entries: Vec<LabelEntry>) -> Result<Self, ConfigurationError> {
        if entries.is_empty() {
            return Err(ConfigurationError::EmptyLabelTable);
        }
        Ok(Self { entries })
    }

    /// Parses the TOML label file format shown in the module docs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Parse`] (with `origin` as the path) on
    /// malformed TOML and [`ConfigurationError::EmptyLabelTable`] if the file
    /// has no `[[class]]` rows.
    pub fn from_toml_str(
        text: &str,
        origin: impl Into<std::path::PathBuf>,
    ) -> Result<Self, ConfigurationError> {
        let file: LabelFile = toml::from_str(text).map_err(|source| ConfigurationError::Parse {
            path: origin.into(),
            source,
        })?;
        Self::new(file.classes)
    }

    pub fn get(&self, index: usize) -> Option<&LabelEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
