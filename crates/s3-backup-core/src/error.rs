//! Error types module
//!
//! The host orchestration layer only ever observes two failure shapes from a
//! backup agent: a backup id that matches no stored object, and a normalized
//! operation failure carrying the store's error code. Every other internal
//! fault is translated into one of these before it crosses the boundary.

/// Errors surfaced by backup agent operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupAgentError {
    /// The requested backup id has no matching object in the bucket.
    #[error("Backup {backup_id} not found")]
    NotFound { backup_id: String },

    /// A store-level fault, normalized with the name of the failing operation.
    #[error("Error during backup operation in {operation}: Code {code}, message: {message}")]
    Operation {
        operation: String,
        /// Store error code, empty when none could be extracted.
        code: String,
        message: String,
    },
}

/// Result type for backup agent operations
pub type BackupResult<T> = Result<T, BackupAgentError>;

impl BackupAgentError {
    pub fn not_found(backup_id: impl Into<String>) -> Self {
        BackupAgentError::NotFound {
            backup_id: backup_id.into(),
        }
    }

    pub fn operation(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BackupAgentError::Operation {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackupAgentError::NotFound { .. })
    }

    /// Name of the operation that failed, if this is a normalized fault.
    pub fn operation_name(&self) -> Option<&str> {
        match self {
            BackupAgentError::Operation { operation, .. } => Some(operation),
            BackupAgentError::NotFound { .. } => None,
        }
    }

    /// Store error code, if this is a normalized fault.
    pub fn code(&self) -> Option<&str> {
        match self {
            BackupAgentError::Operation { code, .. } => Some(code),
            BackupAgentError::NotFound { .. } => None,
        }
    }
}
