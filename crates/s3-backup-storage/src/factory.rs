#[cfg(feature = "storage-memory")]
use crate::MemoryConnector;
#[cfg(feature = "storage-s3")]
use crate::S3Connector;
use crate::{StorageBackend, StoreConnector, StoreResult};
#[cfg(not(all(feature = "storage-s3", feature = "storage-memory")))]
use crate::{StoreError, StoreErrorKind};
use s3_backup_core::StorageConfig;
use std::sync::Arc;

/// Create a store connector based on configuration
pub fn create_connector(config: &StorageConfig) -> StoreResult<Arc<dyn StoreConnector>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let connector = S3Connector::new(config)?;
            Ok(Arc::new(connector))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StoreError::new(
            StoreErrorKind::Config,
            "BackendUnavailable",
            "S3 storage backend not available (storage-s3 feature not enabled)",
        )),

        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => {
            let connector = MemoryConnector::new(config.bucket.clone())
                .with_list_page_size(config.list_page_size);
            Ok(Arc::new(connector))
        }

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => Err(StoreError::new(
            StoreErrorKind::Config,
            "BackendUnavailable",
            "Memory storage backend not available (storage-memory feature not enabled)",
        )),
    }
}
