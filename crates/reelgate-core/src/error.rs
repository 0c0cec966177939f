//! Error types module
//!
//! All fallible operations of the upload and transcoding core return [`AppError`].
//! Admission and session-protocol variants are surfaced to the caller synchronously;
//! pipeline variants are recorded on the video asset by the orchestrator.
//!
//! The `Database` variant carries a `sqlx::Error` when the `sqlx` feature is enabled.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors like validation failures
    Debug,
    /// Recoverable issues
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SESSION_NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether the client may retry the same request
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid chunk index {index}: expected 0..{total}")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("Incomplete upload: {received}/{total} chunks received")]
    IncompleteUpload { received: u32, total: u32 },

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Storage upload failed: {0}")]
    StorageUploadFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::UnsupportedFormat(_) => (415, "UNSUPPORTED_FORMAT", false, LogLevel::Debug),
        AppError::FileTooLarge { .. } => (413, "FILE_TOO_LARGE", false, LogLevel::Debug),
        AppError::SessionNotFound(_) => (404, "SESSION_NOT_FOUND", false, LogLevel::Debug),
        AppError::InvalidChunkIndex { .. } => (400, "INVALID_CHUNK_INDEX", false, LogLevel::Debug),
        AppError::IncompleteUpload { .. } => (409, "INCOMPLETE_UPLOAD", true, LogLevel::Debug),
        AppError::EncodingFailed(_) => (422, "ENCODING_FAILED", false, LogLevel::Warn),
        AppError::StorageUploadFailed(_) => (502, "STORAGE_UPLOAD_FAILED", true, LogLevel::Error),
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::Conflict(_) => (409, "CONFLICT", true, LogLevel::Debug),
        AppError::Cancelled(_) => (409, "CANCELLED", false, LogLevel::Debug),
        AppError::Database(_) => (500, "DATABASE_ERROR", true, LogLevel::Error),
        AppError::Io(_) => (500, "IO_ERROR", true, LogLevel::Error),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Short variant name, used as the `error_type` field in responses and logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::UnsupportedFormat(_) => "UnsupportedFormat",
            AppError::FileTooLarge { .. } => "FileTooLarge",
            AppError::SessionNotFound(_) => "SessionNotFound",
            AppError::InvalidChunkIndex { .. } => "InvalidChunkIndex",
            AppError::IncompleteUpload { .. } => "IncompleteUpload",
            AppError::EncodingFailed(_) => "EncodingFailed",
            AppError::StorageUploadFailed(_) => "StorageUploadFailed",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::Cancelled(_) => "Cancelled",
            AppError::Database(_) => "Database",
            AppError::Io(_) => "Io",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Io(_) => "Failed to access local storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_errors_map_to_client_statuses() {
        let err = AppError::UnsupportedFormat("exe".to_string());
        assert_eq!(err.http_status_code(), 415);
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");

        let err = AppError::FileTooLarge { size: 101, max: 100 };
        assert_eq!(err.http_status_code(), 413);
        assert!(err.to_string().contains("101"));
    }

    #[test]
    fn test_incomplete_upload_is_recoverable() {
        let err = AppError::IncompleteUpload {
            received: 1,
            total: 3,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Incomplete upload: 1/3 chunks received");
    }

    #[test]
    fn test_internal_details_hidden_from_clients() {
        let err = AppError::Internal("secret path /var/lib".to_string());
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: AppError = io_err.into();
        assert_eq!(err.error_type(), "Io");
        assert!(err.detailed_message().contains("gone"));
    }
}
