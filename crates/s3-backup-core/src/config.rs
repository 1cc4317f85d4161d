//! Configuration module
//!
//! Connection settings for the object store and the identity of the backup
//! agent built on top of it. Values come from the environment (and a `.env`
//! file when present). They are handed to the store client as-is; the only
//! validation performed here is that required fields are present.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::constants::{DEFAULT_LIST_PAGE_SIZE, DEFAULT_REGION, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::storage_types::StorageBackend;

/// Object store connection settings
#[derive(Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    // Custom endpoint for S3-compatible providers (MinIO, Ceph, Backblaze, etc.)
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub list_page_size: usize,
    pub request_timeout: Duration,
}

impl Debug for StorageConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("list_page_size", &self.list_page_size)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl StorageConfig {
    /// Settings for an S3-compatible bucket with explicit credentials.
    pub fn s3(
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: bucket.into(),
            access_key_id: Some(access_key_id.into()),
            secret_access_key: Some(secret_access_key.into()),
            endpoint_url: None,
            region: None,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Settings for an in-process bucket.
    pub fn memory(bucket: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Memory,
            bucket: bucket.into(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            region: None,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_list_page_size(mut self, list_page_size: usize) -> Self {
        self.list_page_size = list_page_size;
        self
    }

    /// Region to sign requests for, `us-east-1` when unset.
    pub fn region_or_default(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("S3_BACKUP_BUCKET must not be empty"));
        }

        if self.list_page_size == 0 {
            return Err(anyhow::anyhow!(
                "S3_BACKUP_LIST_PAGE_SIZE must be greater than zero"
            ));
        }

        if self.backend == StorageBackend::S3 {
            if is_blank(&self.access_key_id) {
                return Err(anyhow::anyhow!(
                    "S3_BACKUP_ACCESS_KEY_ID is required for the s3 backend"
                ));
            }
            if is_blank(&self.secret_access_key) {
                return Err(anyhow::anyhow!(
                    "S3_BACKUP_SECRET_ACCESS_KEY is required for the s3 backend"
                ));
            }
        }

        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

/// Settings for one backup agent instance
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Display name, defaults to the bucket name.
    pub name: Option<String>,
    pub storage: StorageConfig,
}

impl AgentConfig {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            name: None,
            storage,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = match non_empty("S3_BACKUP_BACKEND") {
            Some(raw) => raw.parse::<StorageBackend>()?,
            None => StorageBackend::default(),
        };

        let bucket = non_empty("S3_BACKUP_BUCKET")
            .ok_or_else(|| anyhow::anyhow!("S3_BACKUP_BUCKET not configured"))?;

        let list_page_size = match non_empty("S3_BACKUP_LIST_PAGE_SIZE") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                anyhow::anyhow!("Invalid S3_BACKUP_LIST_PAGE_SIZE '{}': {}", raw, e)
            })?,
            None => DEFAULT_LIST_PAGE_SIZE,
        };

        let timeout_secs = match non_empty("S3_BACKUP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                anyhow::anyhow!("Invalid S3_BACKUP_TIMEOUT_SECS '{}': {}", raw, e)
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let storage = StorageConfig {
            backend,
            bucket,
            access_key_id: non_empty("S3_BACKUP_ACCESS_KEY_ID"),
            secret_access_key: non_empty("S3_BACKUP_SECRET_ACCESS_KEY"),
            endpoint_url: non_empty("S3_BACKUP_ENDPOINT_URL"),
            region: non_empty("S3_BACKUP_REGION").or_else(|| non_empty("AWS_REGION")),
            list_page_size,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        let config = AgentConfig {
            name: non_empty("S3_BACKUP_AGENT_NAME"),
            storage,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.storage.validate()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.storage.bucket)
    }

    /// Stable identifier for the agent: the bucket qualified by its endpoint.
    pub fn unique_id(&self) -> String {
        match &self.storage.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                self.storage.bucket
            ),
            None => format!("s3://{}", self.storage.bucket),
        }
    }
}
