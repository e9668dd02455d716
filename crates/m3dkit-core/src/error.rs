//! Unified error handling for m3dkit
//!
//! This module provides the error type shared by the m3dkit crates.
//! Subsystems that can fail on their own (skeleton, textures, the
//! exporter) define narrower errors and convert into this one.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all m3dkit operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Data Errors ====================

    /// Invalid data structure
    #[error("Invalid data: {message}")]
    InvalidData {
        message: String,
    },

    /// Bone hierarchy could not be encoded
    #[error("Skeleton error: {message}")]
    Skeleton {
        message: String,
    },

    /// Texture payload could not be read or converted
    #[error("Texture error: {message}")]
    Texture {
        message: String,
    },

    // ==================== Compression Errors ====================

    /// Compression failed
    #[error("Compression failed: {message}")]
    Compression {
        message: String,
    },

    // ==================== Configuration Errors ====================

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    // ==================== General Errors ====================

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FileNotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::FileNotFound(PathBuf::from("/model.m3d"));
        let contextualized = err.with_context("while writing model");

        assert!(contextualized.to_string().contains("while writing model"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::FileNotFound(PathBuf::from("/test")).is_not_found());
        assert!(Error::FileNotFound(PathBuf::from("/test"))
            .with_context("outer")
            .is_not_found());
        assert!(!Error::invalid_data("bad").is_not_found());
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let with_context = result.context("writing chunk stream");

        let message = with_context.unwrap_err().to_string();
        assert!(message.contains("writing chunk stream"));
        assert!(message.contains("disk full"));
    }
}
