//! Backup agent
//!
//! [`BackupAgent`] is the surface the host backup orchestration layer talks
//! to. [`S3BackupAgent`] implements it on top of an object store connector:
//! every call acquires its own client, resolves backups by scanning the
//! bucket, and reports failures as [`s3_backup_core::BackupAgentError`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use s3_backup_core::constants::{DOMAIN, DOWNLOAD_CHUNK_SIZE};
use s3_backup_core::{AgentConfig, BackupRecord, BackupResult, MetadataEnvelope};
use s3_backup_storage::keys::suggested_filename;
use s3_backup_storage::{create_connector, ObjectStoreClient, StoreConnector};

use crate::catalog;
use crate::errors::{handle_backup_errors, AgentFault};
use crate::transfer::{self, BackupStream, OpenStream};

/// Backup lifecycle operations exposed to the host
///
/// All failures are either `BackupAgentError::NotFound` or
/// `BackupAgentError::Operation`. No operation retries on its own.
#[async_trait]
pub trait BackupAgent: Send + Sync {
    /// Integration domain this agent belongs to.
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    /// Display name
    fn name(&self) -> &str;

    /// Identifier that is stable across restarts
    fn unique_id(&self) -> &str;

    /// Every backup currently stored. The order is unspecified.
    async fn list_backups(&self) -> BackupResult<Vec<BackupRecord>>;

    /// A single backup's record, read from object metadata only.
    async fn get_backup(&self, backup_id: &str) -> BackupResult<BackupRecord>;

    /// Stream a backup's content.
    ///
    /// The stream is lazy and cannot be restarted. Dropping it before the end
    /// releases the underlying connection.
    async fn download_backup(&self, backup_id: &str) -> BackupResult<BackupStream>;

    /// Store a backup. `open_stream` is invoked once to obtain the content.
    async fn upload_backup(&self, backup: &BackupRecord, open_stream: OpenStream)
        -> BackupResult<()>;

    async fn delete_backup(&self, backup_id: &str) -> BackupResult<()>;
}

/// Name and id an agent reports to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
    pub unique_id: String,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_id: unique_id.into(),
        }
    }
}

/// S3-compatible storage backup agent
pub struct S3BackupAgent {
    identity: AgentIdentity,
    connector: Arc<dyn StoreConnector>,
    chunk_size: usize,
}

impl S3BackupAgent {
    pub fn new(identity: AgentIdentity, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            identity,
            connector,
            chunk_size: DOWNLOAD_CHUNK_SIZE,
        }
    }

    /// Build an agent and its store connector from configuration.
    pub fn from_config(config: &AgentConfig) -> BackupResult<Self> {
        let connector = create_connector(&config.storage).map_err(|e| {
            AgentFault::from(e).normalize("create_agent")
        })?;
        let identity = AgentIdentity::new(config.display_name(), config.unique_id());

        tracing::info!(
            name = %identity.name,
            unique_id = %identity.unique_id,
            backend = %config.storage.backend,
            "Backup agent created"
        );

        Ok(Self::new(identity, connector))
    }

    /// Override the download chunk size (8 KiB by default).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        self.connector.bucket()
    }

    async fn connect(&self) -> Result<Box<dyn ObjectStoreClient>, AgentFault> {
        Ok(self.connector.connect().await?)
    }
}

#[async_trait]
impl BackupAgent for S3BackupAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn unique_id(&self) -> &str {
        &self.identity.unique_id
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket()))]
    async fn list_backups(&self) -> BackupResult<Vec<BackupRecord>> {
        handle_backup_errors("list_backups", async {
            let client = self.connect().await?;
            let records = catalog::list(client.as_ref()).await?;
            tracing::debug!(count = records.len(), "Listed backups");
            Ok(records)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket()))]
    async fn get_backup(&self, backup_id: &str) -> BackupResult<BackupRecord> {
        handle_backup_errors("get_backup", async {
            let client = self.connect().await?;
            let entry = catalog::resolve(client.as_ref(), backup_id).await?;
            entry.record()
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket()))]
    async fn download_backup(&self, backup_id: &str) -> BackupResult<BackupStream> {
        handle_backup_errors("download_backup", async {
            let client = self.connect().await?;
            let entry = catalog::resolve(client.as_ref(), backup_id).await?;
            let body = client
                .get_object(&entry.location.key)
                .await
                .map_err(|e| AgentFault::keyed(e, backup_id))?;

            tracing::debug!(
                key = %entry.location.key,
                size_bytes = entry.head.size,
                "Backup download started"
            );

            Ok(transfer::chunked_download(
                client,
                body,
                backup_id,
                entry.location,
                self.chunk_size,
            ))
        })
        .await
    }

    #[tracing::instrument(
        skip(self, backup, open_stream),
        fields(bucket = %self.bucket(), backup_id = %backup.backup_id)
    )]
    async fn upload_backup(
        &self,
        backup: &BackupRecord,
        open_stream: OpenStream,
    ) -> BackupResult<()> {
        handle_backup_errors("upload_backup", async move {
            let start = Instant::now();
            let client = self.connect().await?;

            let envelope = MetadataEnvelope::for_record(backup).map_err(AgentFault::Encode)?;
            let payload = transfer::collect_payload(open_stream).await?;
            let size = payload.len() as u64;
            let key = suggested_filename(backup);

            client
                .put_object(&key, payload, envelope.into_headers())
                .await?;

            tracing::info!(
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Backup upload successful"
            );

            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket()))]
    async fn delete_backup(&self, backup_id: &str) -> BackupResult<()> {
        handle_backup_errors("delete_backup", async {
            let client = self.connect().await?;
            let entry = catalog::resolve(client.as_ref(), backup_id).await?;
            client
                .delete_object(&entry.location.key)
                .await
                .map_err(|e| AgentFault::keyed(e, backup_id))?;

            tracing::info!(key = %entry.location.key, "Backup deleted");
            Ok(())
        })
        .await
    }
}

/// One agent per configured bucket.
pub fn agents_from_configs(configs: &[AgentConfig]) -> BackupResult<Vec<Arc<dyn BackupAgent>>> {
    configs
        .iter()
        .map(|config| {
            S3BackupAgent::from_config(config).map(|agent| Arc::new(agent) as Arc<dyn BackupAgent>)
        })
        .collect()
}

impl std::fmt::Debug for S3BackupAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BackupAgent")
            .field("identity", &self.identity)
            .field("bucket", &self.bucket())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3_backup_core::StorageConfig;

    #[test]
    fn agents_are_built_per_config() {
        let configs = vec![
            AgentConfig::new(StorageConfig::memory("primary")).with_name("Primary"),
            AgentConfig::new(StorageConfig::memory("offsite")),
        ];

        let agents = agents_from_configs(&configs).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name(), "Primary");
        assert_eq!(agents[0].unique_id(), "s3://primary");
        assert_eq!(agents[1].name(), "offsite");
        assert_eq!(agents[1].domain(), "s3_storage");
    }

    #[test]
    fn from_config_builds_s3_agent() {
        let config = AgentConfig::new(
            StorageConfig::s3("backups", "AKIA", "secret").with_endpoint("http://localhost:9000"),
        );
        let agent = S3BackupAgent::from_config(&config).unwrap();
        assert_eq!(agent.bucket(), "backups");
        assert_eq!(agent.unique_id(), "http://localhost:9000/backups");
    }
}
