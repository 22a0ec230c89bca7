//! Error types for the background subtraction engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used across the library
pub type Result<T> = std::result::Result<T, SegmentError>;

/// Errors that abort a segmentation run
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Frame source {path} unavailable: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Frame count of {path} cannot be determined")]
    FrameCountUnknown { path: PathBuf },

    #[error("Frame {index} has dimensions {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Output directory {path} is not writable")]
    DirectoryUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmentError {
    pub fn invalid_parameter<S: Into<String>>(name: &'static str, reason: S) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub fn source_unavailable<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
