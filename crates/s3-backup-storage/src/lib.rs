//! S3 Backup Storage Library
//!
//! This crate provides the object store abstraction the backup agent is
//! written against, plus an S3 implementation (via `object_store`) and an
//! in-memory implementation for tests and dry runs.
//!
//! # Connection discipline
//!
//! A [`StoreConnector`] hands out one [`ObjectStoreClient`] per logical
//! operation. The client is released when it is dropped, so every exit path
//! of an operation (success, error, or an abandoned download stream) gives
//! its handle back.
//!
//! # Object keys
//!
//! Keys are derived from the backup record by [`keys::suggested_filename`].
//! They are flat (no `/`), so a bucket listing never needs a prefix.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_connector;
#[cfg(feature = "storage-memory")]
pub use memory::{MemoryClient, MemoryConnector};
#[cfg(feature = "storage-s3")]
pub use s3::{S3Client, S3Connector};
pub use s3_backup_core::StorageBackend;
pub use traits::{
    ByteStream, ListPage, ObjectEntry, ObjectHead, ObjectStoreClient, StoreConnector, StoreError,
    StoreErrorKind, StoreOp, StoreResult,
};
