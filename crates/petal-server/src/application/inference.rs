//! Inference adapter: the boundary between the protocol engine and the model.
//!
//! A session hands the adapter a decoded image and gets back a
//! [`ClassificationResult`].  Everything model-specific hides behind the
//! [`Classifier`] trait, so the session code never knows whether it is
//! talking to the built-in centroid model or an ONNX graph.
//!
//! # Preprocessing (for beginners)
//!
//! Classifiers expect a fixed-size grid of numbers, not a JPEG.  Before the
//! model runs, the image is:
//!
//! 1. converted to 8-bit RGB (any alpha channel is dropped),
//! 2. resized to exactly the model's input size (299×299 by default),
//! 3. scaled from `0..=255` to `0.0..=1.0`,
//! 4. laid out row by row, three floats per pixel (`HWC` order).
//!
//! Preprocessing runs outside the classifier lock; only the model call
//! itself is serialized.

use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use tracing::debug;

use crate::domain::error::{ClassifierError, ConfigurationError, InferenceError};
use crate::domain::labels::{LabelEntry, LabelTable};
use crate::domain::result::ClassificationResult;

/// Input edge length used when a model does not state its own.
pub const DEFAULT_INPUT_SIZE: u32 = 299;

/// One preprocessed image, batch of one, row-major `H × W × 3`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` values in `0.0..=1.0`.
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// RGB triple at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let base = ((y * self.width + x) * 3) as usize;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }
}

/// Converts a decoded image into the tensor a classifier consumes.
pub fn preprocess(image: &DynamicImage, (width, height): (u32, u32)) -> ImageTensor {
    let rgb = image.to_rgb8();
    let resized = if rgb.dimensions() == (width, height) {
        rgb
    } else {
        imageops::resize(&rgb, width, height, FilterType::CatmullRom)
    };
    let data = resized
        .into_raw()
        .into_iter()
        .map(|channel| f32::from(channel) / 255.0)
        .collect();
    ImageTensor {
        width,
        height,
        data,
    }
}

/// The classification capability.
///
/// Implementations produce one score per class, in label-table order.
/// Higher means more likely; the scores need not be normalized.
#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send {
    /// Number of scores every call to [`classify`](Classifier::classify) returns.
    fn class_count(&self) -> usize;

    /// `(width, height)` the input tensor must have.
    fn input_size(&self) -> (u32, u32);

    fn classify(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifierError>;
}

/// Index of the highest score; the first one wins on ties.
///
/// # Errors
///
/// [`InferenceError::InvalidScore`] if any score is NaN, and
/// [`InferenceError::LabelOutOfRange`] for an empty slice.
pub fn argmax(scores: &[f32]) -> Result<usize, InferenceError> {
    if let Some(index) = scores.iter().position(|s| s.is_nan()) {
        return Err(InferenceError::InvalidScore { index });
    }
    if scores.is_empty() {
        return Err(InferenceError::LabelOutOfRange { index: 0, len: 0 });
    }
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = index;
        }
    }
    Ok(best)
}

/// Thread-safe wrapper around a [`Classifier`] and its [`LabelTable`].
///
/// Shared by every session thread behind an `Arc`.  The label table is
/// immutable; the classifier sits behind a single `Mutex` because most
/// runtimes need `&mut` access to run.
pub struct InferenceAdapter {
    classifier: Mutex<Box<dyn Classifier>>,
    labels: LabelTable,
    input_size: (u32, u32),
    class_count: usize,
}

impl InferenceAdapter {
    /// Pairs a classifier with its label table.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::ClassCountMismatch`] if the classifier does not
    /// produce exactly one score per label row.
    pub fn new(
        classifier: Box<dyn Classifier>,
        labels: LabelTable,
    ) -> Result<Self, ConfigurationError> {
        let class_count = classifier.class_count();
        if class_count != labels.len() {
            return Err(ConfigurationError::ClassCountMismatch {
                labels: labels.len(),
                classes: class_count,
            });
        }
        let input_size = classifier.input_size();
        Ok(Self {
            classifier: Mutex::new(classifier),
            labels,
            input_size,
            class_count,
        })
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    /// Runs the classifier on `image` and returns the raw score vector.
    pub fn classify(&self, image: &DynamicImage) -> Result<Vec<f32>, InferenceError> {
        let tensor = preprocess(image, self.input_size);
        let scores = {
            let mut classifier = self
                .classifier
                .lock()
                .map_err(|_| InferenceError::Unavailable)?;
            classifier.classify(&tensor)?
        };
        if scores.len() != self.class_count {
            return Err(InferenceError::ScoreCount {
                expected: self.class_count,
                actual: scores.len(),
            });
        }
        debug!(?scores, "classifier scores");
        Ok(scores)
    }

    pub fn resolve_label(&self, index: usize) -> Result<&LabelEntry, InferenceError> {
        self.labels.get(index).ok_or(InferenceError::LabelOutOfRange {
            index,
            len: self.labels.len(),
        })
    }

    /// Classifies `image` and resolves the highest-scoring class to its label.
    pub fn predict(&self, image: &DynamicImage) -> Result<ClassificationResult, InferenceError> {
        let scores = self.classify(image)?;
        let index = argmax(&scores)?;
        let label = self.resolve_label(index)?.clone();
        Ok(ClassificationResult {
            index,
            scores,
            label,
        })
    }
}

impl std::fmt::Debug for InferenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceAdapter")
            .field("input_size", &self.input_size)
            .field("class_count", &self.class_count)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
