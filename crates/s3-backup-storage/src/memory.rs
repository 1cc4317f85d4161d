//! In-process object store
//!
//! Behaves like a single S3 bucket: lexicographic paged listing, lowercase
//! user metadata, idempotent deletes and chunked body delivery. It also lets
//! callers inject faults per store call and observe how many client handles
//! are open, which is what the agent tests rely on.

use crate::traits::{
    ByteStream, ListPage, ObjectEntry, ObjectHead, ObjectStoreClient, StoreConnector, StoreError,
    StoreErrorKind, StoreOp, StoreResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_BODY_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
enum StoredBody {
    Bytes(Bytes),
    /// Body of `len` bytes of `fill`, produced on demand and never held in memory.
    Synthetic { len: u64, fill: u8 },
}

impl StoredBody {
    fn len(&self) -> u64 {
        match self {
            StoredBody::Bytes(data) => data.len() as u64,
            StoredBody::Synthetic { len, .. } => *len,
        }
    }

    fn chunk(&self, offset: u64, max: usize) -> Bytes {
        let remaining = self.len().saturating_sub(offset);
        let size = remaining.min(max as u64) as usize;
        match self {
            StoredBody::Bytes(data) => {
                let start = offset as usize;
                data.slice(start..start + size)
            }
            StoredBody::Synthetic { fill, .. } => Bytes::from(vec![*fill; size]),
        }
    }
}

#[derive(Clone)]
struct StoredObject {
    body: StoredBody,
    metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

struct MemoryBucket {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    faults: Mutex<Vec<(StoreOp, StoreError)>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    open_handles: AtomicUsize,
    body_chunks_served: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBucket {
    /// Record a call to `op` and consume the first fault queued for it, if any.
    fn check_fault(&self, op: StoreOp) -> StoreResult<()> {
        *lock(&self.calls).entry(op).or_default() += 1;

        let mut faults = lock(&self.faults);
        match faults.iter().position(|(queued, _)| *queued == op) {
            Some(index) => Err(faults.remove(index).1),
            None => Ok(()),
        }
    }
}

/// Connector for an in-process bucket
///
/// Clones share the same bucket contents.
#[derive(Clone)]
pub struct MemoryConnector {
    bucket: String,
    inner: Arc<MemoryBucket>,
    list_page_size: usize,
    body_chunk_size: usize,
}

impl MemoryConnector {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            inner: Arc::new(MemoryBucket {
                objects: Mutex::new(BTreeMap::new()),
                faults: Mutex::new(Vec::new()),
                calls: Mutex::new(HashMap::new()),
                open_handles: AtomicUsize::new(0),
                body_chunks_served: AtomicU64::new(0),
            }),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            body_chunk_size: DEFAULT_BODY_CHUNK_SIZE,
        }
    }

    pub fn with_list_page_size(mut self, list_page_size: usize) -> Self {
        self.list_page_size = list_page_size.max(1);
        self
    }

    /// Size of the chunks the body stream yields.
    pub fn with_body_chunk_size(mut self, body_chunk_size: usize) -> Self {
        self.body_chunk_size = body_chunk_size.max(1);
        self
    }

    /// Store an object directly, bypassing any fault injection.
    pub fn insert_object(
        &self,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        metadata: HashMap<String, String>,
    ) {
        self.insert(key.into(), StoredBody::Bytes(data.into()), metadata);
    }

    /// Store an object whose body is `len` bytes of `fill`, generated lazily on read.
    pub fn insert_synthetic(
        &self,
        key: impl Into<String>,
        len: u64,
        fill: u8,
        metadata: HashMap<String, String>,
    ) {
        self.insert(key.into(), StoredBody::Synthetic { len, fill }, metadata);
    }

    fn insert(&self, key: String, body: StoredBody, metadata: HashMap<String, String>) {
        let metadata = metadata
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();
        lock(&self.inner.objects).insert(
            key,
            StoredObject {
                body,
                metadata,
                last_modified: Utc::now(),
            },
        );
    }

    /// Make the next `op` call fail with `error`. Faults queue per call type.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        lock(&self.inner.faults).push((op, error));
    }

    pub fn object_keys(&self) -> Vec<String> {
        lock(&self.inner.objects).keys().cloned().collect()
    }

    pub fn object_metadata(&self, key: &str) -> Option<HashMap<String, String>> {
        lock(&self.inner.objects)
            .get(key)
            .map(|object| object.metadata.clone())
    }

    /// Full body of a stored object, materialized. Test helper for small objects.
    pub fn object_body(&self, key: &str) -> Option<Bytes> {
        let objects = lock(&self.inner.objects);
        let object = objects.get(key)?;
        Some(object.body.chunk(0, object.body.len() as usize))
    }

    /// Number of `op` calls made so far, failed ones included.
    pub fn call_count(&self, op: StoreOp) -> usize {
        lock(&self.inner.calls).get(&op).copied().unwrap_or_default()
    }

    /// Number of client handles currently alive.
    pub fn open_handles(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    /// Number of body chunks produced so far across all reads.
    pub fn body_chunks_served(&self) -> u64 {
        self.inner.body_chunks_served.load(Ordering::SeqCst)
    }

    pub fn body_chunk_size(&self) -> usize {
        self.body_chunk_size
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn connect(&self) -> StoreResult<Box<dyn ObjectStoreClient>> {
        self.inner.check_fault(StoreOp::Connect)?;
        self.inner.open_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryClient {
            bucket: self.bucket.clone(),
            inner: Arc::clone(&self.inner),
            list_page_size: self.list_page_size,
            body_chunk_size: self.body_chunk_size,
        }))
    }
}

/// Client handle for an in-process bucket
pub struct MemoryClient {
    bucket: String,
    inner: Arc<MemoryBucket>,
    list_page_size: usize,
    body_chunk_size: usize,
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.inner.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, start_after: Option<&str>) -> StoreResult<ListPage> {
        self.inner.check_fault(StoreOp::List)?;

        let objects = lock(&self.inner.objects);
        let lower = match start_after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut entries: Vec<ObjectEntry> = objects
            .range::<str, _>((lower, Bound::Unbounded))
            .take(self.list_page_size + 1)
            .map(|(key, object)| ObjectEntry {
                key: key.clone(),
                size: object.body.len(),
                last_modified: object.last_modified,
            })
            .collect();

        let next_start_after = if entries.len() > self.list_page_size {
            entries.truncate(self.list_page_size);
            entries.last().map(|entry| entry.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_start_after,
        })
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        self.inner.check_fault(StoreOp::Head)?;

        let objects = lock(&self.inner.objects);
        let object = objects.get(key).ok_or_else(|| StoreError::not_found(key))?;

        // HTTP clients refuse to read non-ASCII header values back.
        if let Some((name, _)) = object.metadata.iter().find(|(_, value)| !value.is_ascii()) {
            return Err(StoreError::new(
                StoreErrorKind::Service,
                "",
                format!("Invalid metadata header value for x-amz-meta-{}", name),
            ));
        }

        Ok(ObjectHead {
            key: key.to_string(),
            size: object.body.len(),
            last_modified: object.last_modified,
            metadata: object.metadata.clone(),
        })
    }

    async fn get_object(&self, key: &str) -> StoreResult<ByteStream> {
        self.inner.check_fault(StoreOp::Get)?;

        let body = lock(&self.inner.objects)
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| StoreError::not_found(key))?;

        let inner = Arc::clone(&self.inner);
        let chunk_size = self.body_chunk_size;

        let stream = stream::unfold(Some(0u64), move |offset| {
            let inner = Arc::clone(&inner);
            let body = body.clone();
            async move {
                let offset = offset?;
                if offset >= body.len() {
                    return None;
                }
                if let Err(e) = inner.check_fault(StoreOp::BodyRead) {
                    return Some((Err(e), None));
                }

                let chunk = body.chunk(offset, chunk_size);
                inner.body_chunks_served.fetch_add(1, Ordering::SeqCst);
                let next = offset + chunk.len() as u64;
                Some((Ok(chunk), Some(next)))
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
        self.inner.check_fault(StoreOp::Put)?;

        let metadata = metadata
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();
        lock(&self.inner.objects).insert(
            key.to_string(),
            StoredObject {
                body: StoredBody::Bytes(data),
                metadata,
                last_modified: Utc::now(),
            },
        );

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.inner.check_fault(StoreOp::Delete)?;
        lock(&self.inner.objects).remove(key);
        Ok(())
    }
}
