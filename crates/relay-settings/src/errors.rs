//! Settings errors.

use thiserror::Error;

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors raised while loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read.
    #[error("failed to read settings at {path}: {reason}")]
    Io {
        /// File path.
        path: String,
        /// Error description.
        reason: String,
    },
    /// Settings file is not valid JSON or has the wrong shape.
    #[error("failed to parse settings: {reason}")]
    Parse {
        /// Error description.
        reason: String,
    },
}
