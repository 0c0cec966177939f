//! Reelgate Core Library
//!
//! This crate provides the domain models, error types, configuration and filename
//! handling shared by every Reelgate component.

pub mod config;
pub mod constants;
pub mod error;
pub mod filename;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, StorageConfig, TranscodeConfig, UploadConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
