//! Classifier backends.
//!
//! - **`centroid`** – Built-in nearest-centroid model over a coarse colour
//!   layout.  No runtime to install; used by default and in tests.
//! - **`onnx`**     – ONNX Runtime graph, compiled only with the `onnx`
//!   feature.

pub mod centroid;
#[cfg(feature = "onnx")]
pub mod onnx;

use tracing::info;

use crate::application::inference::Classifier;
use crate::domain::error::ConfigurationError;
use crate::infrastructure::storage::config::{ModelBackend, ModelConfig};

pub use centroid::CentroidClassifier;
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

/// Builds the classifier named by `config`.
///
/// # Errors
///
/// Whatever the backend reports while loading, or
/// [`ConfigurationError::BackendUnavailable`] if the backend was not compiled
/// in.
pub fn load_classifier(config: &ModelConfig) -> Result<Box<dyn Classifier>, ConfigurationError> {
    let classifier: Box<dyn Classifier> = match config.backend {
        ModelBackend::Centroid => Box::new(CentroidClassifier::load(&config.path)?),
        #[cfg(feature = "onnx")]
        ModelBackend::Onnx => Box::new(OnnxClassifier::load(&config.path)?),
        #[cfg(not(feature = "onnx"))]
        ModelBackend::Onnx => {
            return Err(ConfigurationError::BackendUnavailable("onnx".to_string()))
        }
    };
    info!(
        backend = ?config.backend,
        classes = classifier.class_count(),
        input = ?classifier.input_size(),
        "classifier ready"
    );
    Ok(classifier)
}
