/// Integration domain reported by every backup agent.
pub const DOMAIN: &str = "s3_storage";

/// Version tag written into every object this agent produces.
/// Objects carrying any other value are not treated as backups.
pub const METADATA_VERSION: &str = "1";

/// Object metadata header holding the version tag.
pub const METADATA_VERSION_KEY: &str = "metadata_version";

/// Object metadata header holding the backup id.
pub const BACKUP_ID_KEY: &str = "backup_id";

/// Object metadata header holding the serialized backup record.
pub const BACKUP_METADATA_KEY: &str = "backup_metadata";

/// Maximum size of a chunk handed to download consumers (8 KiB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

/// Default listing page size, matching the S3 `max-keys` ceiling.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Default per-request timeout for the object store client.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";
