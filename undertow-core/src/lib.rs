//! Undertow Core - Range-addressable streaming over chunked remote stores
//!
//! This crate provides the building blocks for exposing files held by a
//! chunk-oriented remote store as HTTP-seekable byte streams, and for drawing
//! bounded interior samples of large remote files for content inspection.

pub mod config;
pub mod mode;
pub mod object;
pub mod sampling;
pub mod store;
pub mod streaming;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{ConfigError, UndertowConfig};
pub use mode::RuntimeMode;
pub use object::{ObjectLocation, RemoteObjectHandle};
pub use sampling::{ContentInspector, InspectionError, SampleError};
pub use store::{ChunkClientError, RemoteChunkClient, StoreLimits};
pub use streaming::{RangeError, StreamError};

/// Core errors that can bubble up from any Undertow subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Store error: {0}")]
    Store(#[from] ChunkClientError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamError),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SampleError),

    #[error("Inspection error: {0}")]
    Inspection(#[from] InspectionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Object not found: {id}")]
    ObjectNotFound { id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Store(e) => match e {
                ChunkClientError::ObjectNotFound { location } => {
                    format!("Remote object {location} does not exist")
                }
                ChunkClientError::Timeout { .. } => "Remote store timed out".to_string(),
                _ => "Remote store error occurred".to_string(),
            },
            UndertowError::Streaming(_) => "Streaming error occurred".to_string(),
            UndertowError::Range(e) => format!("Invalid range request: {e}"),
            UndertowError::Sampling(_) | UndertowError::Inspection(_) => {
                "Content inspection failed".to_string()
            }
            UndertowError::Configuration(e) => format!("Invalid configuration: {e}"),
            UndertowError::ObjectNotFound { id } => format!("File {id} not found"),
            UndertowError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Configuration(_)
                | UndertowError::Range(_)
                | UndertowError::ObjectNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_are_classified() {
        let range = UndertowError::from(RangeError::Malformed {
            header: "bytes=abc".to_string(),
        });
        assert!(range.is_user_error());

        let store = UndertowError::from(ChunkClientError::Cancelled);
        assert!(!store.is_user_error());
        assert_eq!(store.user_message(), "Remote store error occurred");
    }

    #[test]
    fn test_missing_object_message() {
        let error = UndertowError::ObjectNotFound {
            id: "42".to_string(),
        };
        assert_eq!(error.user_message(), "File 42 not found");
    }
}
