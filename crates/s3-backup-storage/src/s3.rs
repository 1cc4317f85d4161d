use crate::traits::{
    ByteStream, ListPage, ObjectEntry, ObjectHead, ObjectStoreClient, StoreConnector, StoreError,
    StoreErrorKind, StoreOp, StoreResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ClientOptions, GetOptions, ObjectMeta, ObjectStore, ObjectStoreExt,
    PutOptions, PutPayload,
};
use s3_backup_core::StorageConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// S3 connector
///
/// Builds the `AmazonS3` store once and hands out lightweight per-operation
/// clients sharing its HTTP connection pool.
#[derive(Clone)]
pub struct S3Connector {
    store: Arc<AmazonS3>,
    bucket: String,
    list_page_size: usize,
}

impl S3Connector {
    /// Create a new S3Connector instance
    ///
    /// Credentials, bucket, region and the optional custom endpoint are taken
    /// from `config` verbatim (e.g. "http://localhost:9000" for MinIO).
    pub fn new(config: &StorageConfig) -> StoreResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(config.bucket.clone())
            .with_region(config.region_or_default())
            .with_client_options(ClientOptions::new().with_timeout(config.request_timeout));

        if let Some(ref access_key_id) = config.access_key_id {
            builder = builder.with_access_key_id(access_key_id.clone());
        }
        if let Some(ref secret_access_key) = config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key.clone());
        }
        if let Some(ref endpoint) = config.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder.build().map_err(|e| {
            StoreError::new(StoreErrorKind::Config, "InvalidConfiguration", e.to_string())
        })?;

        tracing::debug!(
            bucket = %config.bucket,
            region = %config.region_or_default(),
            endpoint = ?config.endpoint_url,
            "S3 connector created"
        );

        Ok(S3Connector {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
            list_page_size: config.list_page_size.max(1),
        })
    }
}

#[async_trait]
impl StoreConnector for S3Connector {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn connect(&self) -> StoreResult<Box<dyn ObjectStoreClient>> {
        Ok(Box::new(S3Client {
            store: Arc::clone(&self.store),
            bucket: self.bucket.clone(),
            list_page_size: self.list_page_size,
        }))
    }
}

/// Per-operation S3 client handle
pub struct S3Client {
    store: Arc<AmazonS3>,
    bucket: String,
    list_page_size: usize,
}

fn map_error(bucket: &str, op: StoreOp, key: &str, err: ObjectStoreError) -> StoreError {
    let (kind, code) = match &err {
        ObjectStoreError::NotFound { .. } => (StoreErrorKind::NotFound, "NoSuchKey"),
        ObjectStoreError::PermissionDenied { .. } => {
            (StoreErrorKind::PermissionDenied, "AccessDenied")
        }
        ObjectStoreError::Unauthenticated { .. } => {
            (StoreErrorKind::PermissionDenied, "InvalidAccessKeyId")
        }
        ObjectStoreError::InvalidPath { .. } => (StoreErrorKind::InvalidRequest, "InvalidKey"),
        ObjectStoreError::Precondition { .. } => {
            (StoreErrorKind::InvalidRequest, "PreconditionFailed")
        }
        _ if op == StoreOp::BodyRead => (StoreErrorKind::Network, ""),
        _ => (StoreErrorKind::Service, ""),
    };

    tracing::debug!(
        error = %err,
        bucket = %bucket,
        key = %key,
        operation = %op,
        "S3 request failed"
    );

    StoreError::new(kind, code, err.to_string())
}

impl S3Client {
    fn map_error(&self, op: StoreOp, key: &str, err: ObjectStoreError) -> StoreError {
        map_error(&self.bucket, op, key, err)
    }
}

/// Take up to `page_size` entries from a listing stream.
///
/// The S3 listing parses every key of a response page into a [`Path`] and
/// fails the whole page when one key has an empty, `.` or `..` segment.
/// Such keys cannot be backups written by this agent, so the listing ends at
/// that page with a warning instead of failing. Objects listed after it are
/// not visible until the offending key is removed.
async fn take_page<S>(listing: &mut S, page_size: usize) -> Result<ListPage, ObjectStoreError>
where
    S: Stream<Item = object_store::Result<ObjectMeta>> + Unpin,
{
    let mut entries = Vec::with_capacity(page_size.min(1000));
    let mut exhausted = false;

    while entries.len() < page_size {
        match listing.next().await {
            Some(Ok(meta)) => entries.push(entry_from_meta(meta)),
            Some(Err(ObjectStoreError::InvalidPath { source })) => {
                tracing::warn!(
                    error = %source,
                    last_key = ?entries.last().map(|entry: &ObjectEntry| entry.key.as_str()),
                    "Bucket listing contains a key that is not a valid path, stopping listing"
                );
                exhausted = true;
                break;
            }
            Some(Err(e)) => return Err(e),
            None => {
                exhausted = true;
                break;
            }
        }
    }

    let next_start_after = if exhausted {
        None
    } else {
        entries.last().map(|entry| entry.key.clone())
    };

    Ok(ListPage {
        entries,
        next_start_after,
    })
}

/// Keys coming back from a listing are already valid paths; anything else is
/// encoded part by part.
fn object_path(key: &str) -> Path {
    Path::parse(key).unwrap_or_else(|_| Path::from(key))
}

fn entry_from_meta(meta: ObjectMeta) -> ObjectEntry {
    ObjectEntry {
        key: meta.location.to_string(),
        size: meta.size,
        last_modified: meta.last_modified,
    }
}

fn user_metadata(attributes: &Attributes) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|(attribute, value)| match attribute {
            Attribute::Metadata(name) => Some((name.to_lowercase(), value.to_string())),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl ObjectStoreClient for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, start_after: Option<&str>) -> StoreResult<ListPage> {
        let mut listing = match start_after {
            Some(offset) => self.store.list_with_offset(None, &object_path(offset)),
            None => self.store.list(None),
        };

        take_page(&mut listing, self.list_page_size)
            .await
            .map_err(|e| self.map_error(StoreOp::List, start_after.unwrap_or(""), e))
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        let mut options = GetOptions::default();
        options.head = true;

        let result = self
            .store
            .get_opts(&object_path(key), options)
            .await
            .map_err(|e| self.map_error(StoreOp::Head, key, e))?;

        Ok(ObjectHead {
            key: key.to_string(),
            size: result.meta.size,
            last_modified: result.meta.last_modified,
            metadata: user_metadata(&result.attributes),
        })
    }

    async fn get_object(&self, key: &str) -> StoreResult<ByteStream> {
        let start = std::time::Instant::now();

        let result = self
            .store
            .get_opts(&object_path(key), GetOptions::default())
            .await
            .map_err(|e| self.map_error(StoreOp::Get, key, e))?;

        let bucket = self.bucket.clone();
        let key = key.to_string();

        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                Err(map_error(&bucket, StoreOp::BodyRead, &key, e))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> StoreResult<()> {
        let mut attributes = Attributes::new();
        for (name, value) in metadata {
            attributes.insert(Attribute::Metadata(name.into()), value.into());
        }

        let mut options = PutOptions::default();
        options.attributes = attributes;

        self.store
            .put_opts(&object_path(key), PutPayload::from(data), options)
            .await
            .map_err(|e| self.map_error(StoreOp::Put, key, e))?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        ObjectStoreExt::delete(self.store.as_ref(), &object_path(key))
            .await
            .map_err(|e| self.map_error(StoreOp::Delete, key, e))
    }
}
