// error.rs — the single error type returned by every pipeline stage.
//
// Every variant is fatal: the pipeline never retries and never salvages a
// partial result. The only recoverable condition (excess input files) is a
// log warning, not an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::gpu::device::GpuError;

/// Errors raised while converting a quilt.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input path, kernel source or first view is missing or unreadable.
    #[error("cannot access {}: {reason}", path.display())]
    Resource { path: PathBuf, reason: String },

    /// An image file could not be parsed.
    #[error("failed to load image {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Fewer views than the grid tolerates were found.
    #[error(
        "the number of input images ({found}) is lower than the expected quilt size ({expected})"
    )]
    InsufficientViews { found: usize, expected: usize },

    /// Host↔device copy failed or addressed a region outside the image.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Kernel compilation, submission or execution failed.
    #[error("compute failed: {0}")]
    Compute(String),

    /// Writing an output file failed.
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Calibration values are missing or violate their invariants.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No usable adapter, or the device request was refused.
    #[error("GPU initialisation failed")]
    Device(#[from] GpuError),
}

impl PipelineError {
    pub(crate) fn resource(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Resource { path: path.into(), reason: reason.to_string() }
    }
}
