//! Error types for drawbridge-core
//!
//! This module provides error types for the session adapter,
//! including mount, serialization, rendering and storage errors.

use thiserror::Error;

use crate::storage::StorageError;

/// Drawbridge error type
#[derive(Debug, Error)]
pub enum Error {
    /// Mount target was empty
    #[error("mount target must not be empty")]
    InvalidMountTarget,

    /// A session is already open on this mount target
    #[error("mount target already has an open session: {0}")]
    AlreadyMounted(String),

    /// The drawing library failed to create the editor
    #[error("failed to mount editor on {target}: {reason}")]
    Mount {
        /// Mount target that failed
        target: String,
        /// Reason reported by the library
        reason: String,
    },

    /// Scene document could not be understood by the engine
    #[error("invalid scene document: {0}")]
    InvalidDocument(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Rendering error
    #[error("rendering error: {0}")]
    Rendering(String),

    /// Local storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a mount error for a target
    #[must_use]
    pub fn mount(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Mount {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid document error
    #[must_use]
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a rendering error
    #[must_use]
    pub fn rendering(msg: impl Into<String>) -> Self {
        Self::Rendering(msg.into())
    }

    /// Check if error is recoverable
    ///
    /// Recoverable errors leave the session usable; the next autosave
    /// tick or export call may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_) | Self::Rendering(_) | Self::Storage(_)
        )
    }

    /// Get a stable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMountTarget => "invalid_mount_target",
            Self::AlreadyMounted(_) => "already_mounted",
            Self::Mount { .. } => "mount_failed",
            Self::InvalidDocument(_) => "invalid_document",
            Self::Serialization(_) => "serialization_error",
            Self::Rendering(_) => "rendering_error",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Rendering(err.to_string())
    }
}

/// Result type alias for drawbridge operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::AlreadyMounted("editor1".to_string());
        assert_eq!(err.code(), "already_mounted");

        let err = Error::mount("editor1", "bad scene");
        assert_eq!(err.code(), "mount_failed");

        let err = Error::Config("autosave_interval_secs must be at least 1".to_string());
        assert_eq!(err.code(), "config_error");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::rendering("canvas too large").is_recoverable());
        assert!(Error::Storage(StorageError::Disabled).is_recoverable());
        assert!(!Error::InvalidMountTarget.is_recoverable());
        assert!(!Error::mount("editor1", "boom").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::mount("editor1", "unexpected token");
        let msg = err.to_string();
        assert!(msg.contains("editor1"));
        assert!(msg.contains("unexpected token"));
    }

    #[test]
    fn test_from_serde_error() {
        let result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        let err: Error = result.unwrap_err().into();
        assert_eq!(err.code(), "serialization_error");
    }
}
