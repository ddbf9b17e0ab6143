//! Custom error types for neural-style.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the neural-style library.
#[derive(Error, Debug)]
pub enum Error {
    /// A content, style or weight file does not exist.
    #[error("no such file: {}", path.display())]
    MissingFile { path: PathBuf },

    /// Failed to decode an image file.
    #[error("failed to load image from {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {}: {source}", path.display())]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to read an array from the weight archive.
    #[error("failed to read {entry} from weight store: {source}")]
    WeightStoreRead {
        entry: String,
        #[source]
        source: ndarray_npy::ReadNpzError,
    },

    /// Failed to write the weight archive.
    #[error("failed to write weight store {}: {source}", path.display())]
    WeightStoreWrite {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpzError,
    },

    /// The weight store does not describe a VGG19 network.
    #[error("malformed weight store: layer {index}: {reason}")]
    MalformedWeightStore { index: usize, reason: String },

    /// The weight store holds the wrong number of conv layers.
    #[error("malformed weight store: expected {expected} conv layers, found {found}")]
    WeightStoreLayerCount { expected: usize, found: usize },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration {name}: {reason}")]
    InvalidConfiguration { name: String, reason: String },

    /// A region-of-interest weight map could not be parsed.
    #[error("invalid weight map {} at line {line}: {reason}", path.display())]
    InvalidWeightMap {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The objective produced a non-finite value during optimization.
    #[error("numeric instability in block {block}, iteration {iteration}: {what} is not finite")]
    NumericInstability {
        block: usize,
        iteration: usize,
        what: &'static str,
    },

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// An array could not be reshaped.
    #[error("tensor layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedWeightStore {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type alias for neural-style operations.
pub type Result<T> = std::result::Result<T, Error>;
