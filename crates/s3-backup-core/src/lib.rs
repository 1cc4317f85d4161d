//! S3 Backup Core Library
//!
//! This crate provides the domain model, error taxonomy and configuration
//! shared by the storage backends, the backup agent and the CLI.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AgentConfig, StorageConfig};
pub use error::{BackupAgentError, BackupResult};
pub use models::{BackupRecord, MetadataEnvelope, StoreLocation};
pub use storage_types::StorageBackend;
