//! ONNX Runtime classifier backend (`onnx` feature).
//!
//! Expects an image classification graph with one NHWC input of shape
//! `[1, H, W, 3]` (f32, values in `0.0..=1.0`) and a first output holding one
//! score per class.

use std::path::Path;

use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tracing::{debug, info};

use crate::application::inference::{Classifier, ImageTensor, DEFAULT_INPUT_SIZE};
use crate::domain::error::{ClassifierError, ConfigurationError};

pub struct OnnxClassifier {
    session: Session,
    input_size: (u32, u32),
    class_count: usize,
}

impl OnnxClassifier {
    /// Loads the graph at `path` and determines its input size and class
    /// count.
    ///
    /// The class count comes from the output shape when it is static, and
    /// from one warm-up run on a blank image otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Err(ConfigurationError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let session = open_session(path)
            .map_err(|e| ConfigurationError::InvalidModel(format!("{}: {e}", path.display())))?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| infer_input_size(input.dtype()))
            .unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));
        let static_classes = session
            .outputs()
            .first()
            .and_then(|output| infer_class_count(output.dtype()));

        let mut classifier = Self {
            session,
            input_size,
            class_count: static_classes.unwrap_or(0),
        };
        if static_classes.is_none() {
            let (width, height) = input_size;
            let blank = ImageTensor {
                width,
                height,
                data: vec![0.0; (width * height * 3) as usize],
            };
            let scores = classifier
                .run(&blank)
                .map_err(|e| ConfigurationError::InvalidModel(format!("warm-up run failed: {e}")))?;
            debug!(classes = scores.len(), "class count from warm-up run");
            classifier.class_count = scores.len();
        }
        if classifier.class_count == 0 {
            return Err(ConfigurationError::InvalidModel(
                "model produces no scores".to_string(),
            ));
        }

        info!(
            classes = classifier.class_count,
            input = ?input_size,
            model = %path.display(),
            "loaded ONNX classifier"
        );
        Ok(classifier)
    }

    fn run(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        let backend = |e: ort::Error| ClassifierError::Backend(e.to_string());
        let shape = [1i64, i64::from(tensor.height), i64::from(tensor.width), 3];
        let input = Tensor::from_array((shape, tensor.data.clone().into_boxed_slice()))
            .map_err(backend)?;
        let outputs = self.session.run(ort::inputs![input]).map_err(backend)?;
        let (_, scores) = outputs[0].try_extract_tensor::<f32>().map_err(backend)?;
        Ok(scores.to_vec())
    }
}

impl Classifier for OnnxClassifier {
    fn class_count(&self) -> usize {
        self.class_count
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn classify(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        if (tensor.width, tensor.height) != self.input_size {
            return Err(ClassifierError::InputShape {
                width: self.input_size.0,
                height: self.input_size.1,
                actual_width: tensor.width,
                actual_height: tensor.height,
            });
        }
        self.run(tensor)
    }
}

fn open_session(path: &Path) -> ort::Result<Session> {
    Ok(Session::builder()?.commit_from_file(path)?)
}

/// `(W, H)` from a static `[N, H, W, 3]` input shape.
fn infer_input_size(input_type: &ValueType) -> Option<(u32, u32)> {
    match input_type {
        ValueType::Tensor { shape, .. } if shape.len() == 4 => {
            let height = u32::try_from(shape[1]).ok().filter(|&h| h > 0)?;
            let width = u32::try_from(shape[2]).ok().filter(|&w| w > 0)?;
            Some((width, height))
        }
        _ => None,
    }
}

/// Last dimension of the output shape, if static.
fn infer_class_count(output_type: &ValueType) -> Option<usize> {
    match output_type {
        ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
