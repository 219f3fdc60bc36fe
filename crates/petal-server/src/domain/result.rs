//! Outcome of a successful classification.

use crate::domain::labels::LabelEntry;

/// Default text placed before the label pair in the response line.
pub const DEFAULT_RESPONSE_PREFIX: &str = "Flower classification";

/// Predicted class, raw scores, and the resolved names.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Index of the highest score; always a valid label-table row.
    pub index: usize,
    /// One score per class, in model output order.
    pub scores: Vec<f32>,
    pub label: LabelEntry,
}

impl ClassificationResult {
    /// Formats the single UTF-8 line sent back to the client, e.g.
    /// `Flower classification : 장미(rose)`.
    pub fn response_line(&self, prefix: &str) -> String {
        format!(
            "{prefix} : {}({})",
            self.label.ko_class, self.label.en_class
        )
    }
}
