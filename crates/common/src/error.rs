//! Error types shared across LazyEyes crates.

use std::path::PathBuf;

/// Top-level error type for LazyEyes operations.
#[derive(Debug, thiserror::Error)]
pub enum LazyEyesError {
    /// The frame source could not deliver a frame. Recoverable: the
    /// processing loop logs it and retries on the next iteration.
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    /// The temporal transform failed or produced unusable output.
    /// Fatal to the processing loop.
    #[error("Transform error: {message}")]
    Transform { message: String },

    /// Invalid configuration. Raised at construction, never mid-stream.
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LazyEyesError.
pub type LazyEyesResult<T> = Result<T, LazyEyesError>;

impl LazyEyesError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the processing loop may continue after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Capture { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_capture_errors_are_transient() {
        assert!(LazyEyesError::capture("camera hiccup").is_transient());
        assert!(!LazyEyesError::transform("plan failed").is_transient());
        assert!(!LazyEyesError::config("bad passband").is_transient());
    }

    #[test]
    fn display_includes_category() {
        let err = LazyEyesError::config("min_hz must be below max_hz");
        assert_eq!(
            err.to_string(),
            "Configuration error: min_hz must be below max_hz"
        );
    }
}
