//! Fault normalization
//!
//! Internally every operation works with [`AgentFault`]. At the public
//! boundary [`handle_backup_errors`] turns it into a [`BackupAgentError`]:
//! not-found stays not-found, everything else becomes an operation failure
//! carrying the operation name and the store's error code.

use std::future::Future;
use std::io;

use s3_backup_core::{BackupAgentError, BackupResult};
use s3_backup_storage::StoreError;

pub(crate) const INVALID_METADATA_CODE: &str = "InvalidMetadata";
pub(crate) const SOURCE_STREAM_CODE: &str = "SourceStreamError";

#[derive(Debug, thiserror::Error)]
pub(crate) enum AgentFault {
    #[error("Backup {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid backup metadata on object {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode backup metadata: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to read backup stream: {0}")]
    Source(#[source] io::Error),
}

impl AgentFault {
    /// Store fault on a key already resolved for `backup_id`. A missing key
    /// means the backup disappeared after resolution.
    pub(crate) fn keyed(err: StoreError, backup_id: &str) -> Self {
        if err.is_not_found() {
            AgentFault::NotFound(backup_id.to_string())
        } else {
            AgentFault::Store(err)
        }
    }

    pub(crate) fn normalize(self, operation: &'static str) -> BackupAgentError {
        let (code, message) = match &self {
            AgentFault::NotFound(backup_id) => return BackupAgentError::not_found(backup_id.clone()),
            AgentFault::Store(err) => (err.code.clone(), err.message.clone()),
            AgentFault::Decode { .. } | AgentFault::Encode(_) => {
                (INVALID_METADATA_CODE.to_string(), self.to_string())
            }
            AgentFault::Source(_) => (SOURCE_STREAM_CODE.to_string(), self.to_string()),
        };

        tracing::debug!(
            operation,
            code = %code,
            error = %self,
            details = ?self,
            "Error during backup in {}: Code {}, message {}",
            operation,
            code,
            message
        );

        BackupAgentError::operation(operation, code, message)
    }
}

/// Run one agent operation and normalize whatever fault it raises.
pub(crate) async fn handle_backup_errors<T, F>(operation: &'static str, fut: F) -> BackupResult<T>
where
    F: Future<Output = Result<T, AgentFault>>,
{
    fut.await.map_err(|fault| fault.normalize(operation))
}
