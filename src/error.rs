//! Error types for dataset conversion.

use ndarray_npy::{ReadNpzError, WriteNpyError, WriteNpzError};
use std::path::PathBuf;
use thiserror::Error;

/// Conversion error type
#[derive(Error, Debug)]
pub enum DatasetError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Array shape error
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Failed to write a `.npy` unit
    #[error("NPY write error: {0}")]
    WriteNpy(#[from] WriteNpyError),

    /// Failed to write a `.npz` unit
    #[error("NPZ write error: {0}")]
    WriteNpz(#[from] WriteNpzError),

    /// Configuration error (fatal before or during processing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A feature store unit could not be opened
    #[error("Cannot open feature store unit {}: {source}", path.display())]
    UnitOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A feature store unit could not be decoded
    #[error("Cannot read feature store unit {}: {source}", path.display())]
    UnitRead {
        path: PathBuf,
        #[source]
        source: ReadNpzError,
    },

    /// A required attribute is absent from a unit
    #[error("Attribute '{name}' missing from {}", path.display())]
    MissingAttribute { path: PathBuf, name: String },

    /// Attribute leading dimensions disagree
    #[error("Alignment error: {0}")]
    Alignment(String),

    /// Nothing left to convert; callers exit cleanly
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Failure reported by an injected predictor
    #[error("Inference error: {0}")]
    Inference(String),
}

impl DatasetError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        DatasetError::Config(msg.into())
    }

    /// True for the benign empty-dataset condition.
    pub fn is_empty_dataset(&self) -> bool {
        matches!(self, DatasetError::EmptyDataset(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DatasetError>;
