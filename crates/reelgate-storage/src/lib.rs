//! Reelgate Storage Library
//!
//! Object storage abstraction with S3 (via `object_store`) and local filesystem backends.
//!
//! # Storage key format
//!
//! Every artifact of a video lives under `videos/{asset_id}/`; see the `keys` module.
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod mime;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod url;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use reelgate_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectMetadata, Storage, StorageError, StorageResult, StoredObject};
