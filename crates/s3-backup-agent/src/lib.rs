//! S3 Backup Agent Library
//!
//! Maps a backup lifecycle (list, get, download, upload, delete) onto an
//! S3-compatible bucket. There is no index object: each stored backup
//! describes itself through object metadata, and every query rebuilds the
//! catalog by scanning the bucket.
//!
//! # Object metadata
//!
//! | header | value |
//! |---|---|
//! | `metadata_version` | `"1"` |
//! | `backup_id` | id of the backup |
//! | `backup_metadata` | JSON-serialized [`BackupRecord`] |
//!
//! Objects without these headers, or with another version tag, are ignored.

pub mod agent;
mod catalog;
mod errors;
pub mod transfer;

// Re-export commonly used types
pub use agent::{agents_from_configs, AgentIdentity, BackupAgent, S3BackupAgent};
pub use s3_backup_core::{BackupAgentError, BackupRecord, BackupResult};
pub use transfer::{open_chunks, open_stream, BackupStream, ChunkStream, OpenStream};
