//! Error types shared by every stage of the mosaic pipeline

use std::path::PathBuf;

/// Main error type for all mosaic operations
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    /// Failed to load an image from the filesystem
    #[error("Failed to load image '{}': {source}", path.display())]
    ImageLoad {
        /// Path to the image file
        path: PathBuf,
        /// Underlying image loading error
        source: image::ImageError,
    },

    /// Failed to save a composed image to disk
    #[error("Failed to export image to '{}': {source}", path.display())]
    ImageExport {
        /// Path where export was attempted
        path: PathBuf,
        /// Underlying image export error
        source: image::ImageError,
    },

    /// Configuration value failed validation
    #[error("Invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: &'static str,
        /// Provided value that failed validation
        value: String,
        /// Explanation of why the value is invalid
        reason: String,
    },

    /// Input data doesn't meet pipeline requirements
    #[error("Invalid source data: {reason}")]
    InvalidSourceData {
        /// Description of what's wrong with the input
        reason: String,
    },

    /// General file system operation failure
    #[error("File system error during {operation} on '{}': {source}", path.display())]
    FileSystem {
        /// Path involved in the operation
        path: PathBuf,
        /// Description of the operation that failed
        operation: &'static str,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Numerical computation produced an invalid result
    #[error("Computation error in {operation}: {reason}")]
    Computation {
        /// Name of the computation that failed
        operation: &'static str,
        /// Description of the failure
        reason: String,
    },

    /// The exact assignment solver could not produce a complete matching
    #[error("Assignment solver failed on a {size}x{size} cost matrix: {reason}")]
    SolverFailure {
        /// Side length of the square cost matrix
        size: usize,
        /// Description of the failure
        reason: String,
    },

    /// Numeric backend could not be initialised or executed
    #[error("Backend error: {reason}")]
    Backend {
        /// Description of the failure
        reason: String,
    },
}

/// Convenience type alias for mosaic results
pub type Result<T> = std::result::Result<T, MosaicError>;

impl From<image::ImageError> for MosaicError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageLoad {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

impl From<std::io::Error> for MosaicError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("<unknown>"),
            operation: "unknown",
            source: err,
        }
    }
}

/// Create an invalid parameter error
pub fn invalid_parameter(
    parameter: &'static str,
    value: &impl ToString,
    reason: &impl ToString,
) -> MosaicError {
    MosaicError::InvalidParameter {
        parameter,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Create a computation error
pub fn computation_error(operation: &'static str, reason: &impl ToString) -> MosaicError {
    MosaicError::Computation {
        operation,
        reason: reason.to_string(),
    }
}

/// Create a backend error
pub fn backend_error(reason: &impl ToString) -> MosaicError {
    MosaicError::Backend {
        reason: reason.to_string(),
    }
}
