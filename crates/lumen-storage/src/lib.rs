//! Lumen Storage Library
//!
//! Storage abstraction over an S3-compatible object store or the local
//! filesystem. Every backend addresses blobs by the same opaque key, for
//! example `uploads/{file_id}/photo.jpg` for originals and
//! `processed/{file_id}/{variant}/{filename}` for derived variants.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use lumen_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{validate_key, Storage, StorageError, StorageResult};
