//! Nearest-centroid classifier over a coarse colour layout.
//!
//! # How it works (for beginners)
//!
//! The input image is divided into a `grid × grid` raster of cells and each
//! cell is reduced to its mean RGB colour.  Concatenating the cells gives a
//! feature vector of `grid * grid * 3` numbers, scaled to unit length.
//!
//! Every class has a reference vector of the same length (its *centroid*).
//! A class's score is the cosine similarity between the image's feature and
//! that centroid, so scores fall in `-1.0..=1.0` and the highest one wins.
//!
//! Model file format:
//!
//! ```toml
//! input_size = 299
//! grid = 2
//!
//! [[centroid]]   # class 0
//! values = [0.9, 0.9, 0.8,  0.9, 0.9, 0.8,  0.9, 0.9, 0.8,  0.9, 0.9, 0.8]
//!
//! [[centroid]]   # class 1
//! values = [0.8, 0.1, 0.2,  0.8, 0.1, 0.2,  0.8, 0.1, 0.2,  0.8, 0.1, 0.2]
//! ```
//!
//! Centroid order must match the label table.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::application::inference::{Classifier, ImageTensor, DEFAULT_INPUT_SIZE};
use crate::domain::error::{ClassifierError, ConfigurationError};

#[derive(Debug, Deserialize)]
struct CentroidFile {
    #[serde(default = "default_input_size")]
    input_size: u32,
    #[serde(default = "default_grid")]
    grid: u32,
    #[serde(default, rename = "centroid")]
    centroids: Vec<CentroidRow>,
}

#[derive(Debug, Deserialize)]
struct CentroidRow {
    values: Vec<f32>,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}
fn default_grid() -> u32 {
    4
}

/// Scores images by cosine similarity to one reference vector per class.
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    input_size: u32,
    grid: u32,
    /// Unit-length, `grid * grid * 3` values each.
    centroids: Vec<Vec<f32>>,
}

impl CentroidClassifier {
    /// Builds a classifier from raw centroids, normalizing each one.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidModel`] if the sizes are zero, the grid is
    /// finer than the input, there are no centroids, or a centroid has the
    /// wrong length, a non-finite value, or zero length.
    pub fn new(
        input_size: u32,
        grid: u32,
        centroids: Vec<Vec<f32>>,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::InvalidModel(msg));
        if input_size == 0 || grid == 0 {
            return invalid(format!(
                "input_size ({input_size}) and grid ({grid}) must be positive"
            ));
        }
        if grid > input_size {
            return invalid(format!(
                "grid ({grid}) is finer than the input size ({input_size})"
            ));
        }
        if centroids.is_empty() {
            return invalid("model defines no centroids".to_string());
        }

        let expected = (grid * grid * 3) as usize;
        let mut normalized = Vec::with_capacity(centroids.len());
        for (class, mut values) in centroids.into_iter().enumerate() {
            if values.len() != expected {
                return invalid(format!(
                    "centroid {class} has {} values, expected {expected}",
                    values.len()
                ));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return invalid(format!("centroid {class} contains a non-finite value"));
            }
            if !normalize(&mut values) {
                return invalid(format!("centroid {class} is all zeros"));
            }
            normalized.push(values);
        }

        Ok(Self {
            input_size,
            grid,
            centroids: normalized,
        })
    }

    /// Parses the TOML model format shown in the module docs.
    pub fn from_toml_str(
        text: &str,
        origin: impl Into<std::path::PathBuf>,
    ) -> Result<Self, ConfigurationError> {
        let file: CentroidFile =
            toml::from_str(text).map_err(|source| ConfigurationError::Parse {
                path: origin.into(),
                source,
            })?;
        let rows = file.centroids.into_iter().map(|row| row.values).collect();
        Self::new(file.input_size, file.grid, rows)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let classifier = Self::from_toml_str(&text, path)?;
        info!(
            classes = classifier.centroids.len(),
            grid = classifier.grid,
            path = %path.display(),
            "loaded centroid model"
        );
        Ok(classifier)
    }

    /// Mean colour of each grid cell, scaled to unit length.
    fn feature(&self, tensor: &ImageTensor) -> Vec<f32> {
        let grid = self.grid;
        let mut feature = Vec::with_capacity((grid * grid * 3) as usize);
        for gy in 0..grid {
            let (y0, y1) = cell_bounds(gy, grid, tensor.height);
            for gx in 0..grid {
                let (x0, x1) = cell_bounds(gx, grid, tensor.width);
                let mut sum = [0.0f32; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let pixel = tensor.pixel(x, y);
                        for (acc, channel) in sum.iter_mut().zip(pixel) {
                            *acc += channel;
                        }
                    }
                }
                let count = ((y1 - y0) * (x1 - x0)).max(1) as f32;
                feature.extend(sum.iter().map(|total| total / count));
            }
        }
        normalize(&mut feature);
        feature
    }
}

/// Pixel range `[start, end)` covered by cell `index` of `cells` along an
/// axis of `extent` pixels.
fn cell_bounds(index: u32, cells: u32, extent: u32) -> (u32, u32) {
    (index * extent / cells, (index + 1) * extent / cells)
}

/// Scales `v` to unit length.  Returns `false` for an all-zero vector.
fn normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
        true
    } else {
        false
    }
}

impl Classifier for CentroidClassifier {
    fn class_count(&self) -> usize {
        self.centroids.len()
    }

    fn input_size(&self) -> (u32, u32) {
        (self.input_size, self.input_size)
    }

    fn classify(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        if (tensor.width, tensor.height) != (self.input_size, self.input_size) {
            return Err(ClassifierError::InputShape {
                width: self.input_size,
                height: self.input_size,
                actual_width: tensor.width,
                actual_height: tensor.height,
            });
        }
        let feature = self.feature(tensor);
        Ok(self
            .centroids
            .iter()
            .map(|centroid| centroid.iter().zip(&feature).map(|(a, b)| a * b).sum())
            .collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
