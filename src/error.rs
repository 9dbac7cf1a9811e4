//! Error types for layer background removal

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types for the export → segment → composite pipeline
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// The configured segmenter executable does not exist on disk
    #[error("Segmenter executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    /// The segmenter exited with a non-zero status; carries its captured stderr
    #[error("Segmentation failed: {0}")]
    SegmenterFailed(String),

    /// The segmenter did not exit within the configured timeout
    #[error("Segmentation timed out after {}s", .0.as_secs_f64())]
    SegmenterTimedOut(Duration),

    /// The segmenter exited successfully but left no cutout behind
    #[error("Output was not created by the segmenter: {}", .0.display())]
    OutputNotProduced(PathBuf),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The host rejected a document or layer operation
    #[error("Host error: {0}")]
    Host(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Attaching a mask to the cutout failed (best-effort, never propagated)
    #[error("Mask attach failed: {0}")]
    MaskAttach(String),

    /// Removing the original layer failed (best-effort, never propagated)
    #[error("Original layer removal failed: {0}")]
    LayerRemoval(String),

    /// One or more documents of a batch failed
    #[error("Batch processing failed: {0}")]
    Batch(String),
}

impl BgRemovalError {
    /// Create a new host error
    pub fn host<S: Into<String>>(msg: S) -> Self {
        Self::Host(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new segmentation failure from captured stderr
    pub fn segmenter_failed<S: Into<String>>(stderr: S) -> Self {
        Self::SegmenterFailed(stderr.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }
}

/// Explicitly discard the error of an optional step after logging it.
///
/// Call sites use this instead of a silent `let _ =` so that every suppressed
/// failure is visible in the trace output.
pub trait BestEffort {
    fn best_effort(self, step: &str);
}

impl<T> BestEffort for Result<T> {
    fn best_effort(self, step: &str) {
        if let Err(e) = self {
            tracing::warn!(step = %step, error = %e, "Best-effort step failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = BgRemovalError::invalid_config("bad model index");
        assert_eq!(err.to_string(), "Invalid configuration: bad model index");

        let err = BgRemovalError::ExecutableNotFound(PathBuf::from("/opt/rembg/bin/python"));
        assert!(err.to_string().contains("/opt/rembg/bin/python"));

        let err = BgRemovalError::segmenter_failed("ModuleNotFoundError: rembg");
        assert_eq!(
            err.to_string(),
            "Segmentation failed: ModuleNotFoundError: rembg"
        );
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BgRemovalError::file_io_error("write export", Path::new("/tmp/x.jpg"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write export"));
        assert!(error_string.contains("/tmp/x.jpg"));
    }

    #[test]
    fn test_config_value_error() {
        let err = BgRemovalError::config_value_error("matting erode", 150, "1-100", Some(15));
        let error_string = err.to_string();
        assert!(error_string.contains("matting erode"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("1-100"));
        assert!(error_string.contains("Recommended: 15"));
    }

    #[test]
    fn test_best_effort_swallows_error() {
        let failing: Result<()> = Err(BgRemovalError::MaskAttach("unsupported".into()));
        failing.best_effort("attach mask");
        let ok: Result<u32> = Ok(3);
        ok.best_effort("noop");
    }
}
