//! Object store abstraction traits
//!
//! This module defines the narrow client surface the backup agent needs from
//! an S3-compatible store: paged listing, header reads, streaming body reads,
//! single-shot puts with metadata, and deletes.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use thiserror::Error;

/// Category of a store-level fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The addressed object does not exist.
    NotFound,
    PermissionDenied,
    InvalidRequest,
    Network,
    Service,
    Config,
}

/// A fault reported by the object store client
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    /// Store error code (`NoSuchKey`, `AccessDenied`, ...), empty when unknown.
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(
            StoreErrorKind::NotFound,
            "NoSuchKey",
            format!("The specified key does not exist: {}", key),
        )
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::PermissionDenied, "AccessDenied", message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

/// Result type for object store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Object store calls, used to label faults and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Connect,
    List,
    Head,
    Get,
    BodyRead,
    Put,
    Delete,
}

impl Display for StoreOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            StoreOp::Connect => "connect",
            StoreOp::List => "list_objects",
            StoreOp::Head => "head_object",
            StoreOp::Get => "get_object",
            StoreOp::BodyRead => "read_body",
            StoreOp::Put => "put_object",
            StoreOp::Delete => "delete_object",
        };
        f.write_str(name)
    }
}

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Key to resume after; `None` once the listing is exhausted.
    pub next_start_after: Option<String>,
}

/// Result of a header-only read
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// User metadata attached at upload, keyed by lowercase header name.
    pub metadata: HashMap<String, String>,
}

/// Lazily produced object body
pub type ByteStream = Pin<Box<dyn Stream<Item = StoreResult<Bytes>> + Send>>;

/// Client handle for one logical operation against a single bucket
///
/// Dropping the handle releases it. Implementations must not require an
/// explicit close call.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Bucket this client is bound to.
    fn bucket(&self) -> &str;

    /// Fetch one page of keys in lexicographic order, strictly after
    /// `start_after` when given.
    async fn list_page(&self, start_after: Option<&str>) -> StoreResult<ListPage>;

    /// Read an object's size, timestamp and user metadata without its body.
    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead>;

    /// Open a streaming read of an object's body.
    async fn get_object(&self, key: &str) -> StoreResult<ByteStream>;

    /// Store `data` under `key` in a single request, replacing any existing object.
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> StoreResult<()>;

    async fn delete_object(&self, key: &str) -> StoreResult<()>;
}

/// Source of per-operation client handles
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Bucket the produced clients are bound to.
    fn bucket(&self) -> &str;

    /// Acquire a client handle for one operation.
    async fn connect(&self) -> StoreResult<Box<dyn ObjectStoreClient>>;
}
