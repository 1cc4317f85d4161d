//! Backup data movement
//!
//! Downloads are exposed as a lazy stream of bounded chunks that owns the
//! store client for its whole lifetime. Uploads drain the caller's chunk
//! source into one buffer and go out as a single put.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use s3_backup_core::{BackupResult, StoreLocation};
use s3_backup_storage::{ByteStream, ObjectStoreClient};

use crate::errors::AgentFault;

/// Chunks of backup content supplied by the caller
pub type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Factory producing a fresh [`ChunkStream`] when invoked
pub type OpenStream = Box<dyn FnOnce() -> BoxFuture<'static, io::Result<ChunkStream>> + Send>;

/// Downloaded backup content
pub type BackupStream = Pin<Box<dyn Stream<Item = BackupResult<Bytes>> + Send>>;

/// Wrap an async factory as an [`OpenStream`].
pub fn open_stream<F, Fut>(factory: F) -> OpenStream
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<ChunkStream>> + Send + 'static,
{
    Box::new(move || Box::pin(factory()))
}

/// An [`OpenStream`] yielding the given chunks.
pub fn open_chunks(chunks: Vec<Bytes>) -> OpenStream {
    open_stream(move || async move {
        let stream: ChunkStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
        Ok(stream)
    })
}

/// Drain the caller's chunk source into a single payload.
///
/// The whole backup is held in memory until the put completes. A failure
/// while reading aborts before anything is written.
pub(crate) async fn collect_payload(open: OpenStream) -> Result<Bytes, AgentFault> {
    let mut chunks = open().await.map_err(AgentFault::Source)?;
    let mut buffer = BytesMut::new();

    while let Some(chunk) = chunks.next().await {
        buffer.extend_from_slice(&chunk.map_err(AgentFault::Source)?);
    }

    Ok(buffer.freeze())
}

struct DownloadState {
    /// Client and body; dropped as soon as the body ends or fails.
    connection: Option<(Box<dyn ObjectStoreClient>, ByteStream)>,
    pending: Bytes,
    chunk_size: usize,
    backup_id: String,
    location: StoreLocation,
    bytes_sent: u64,
    started: Instant,
}

/// Re-chunk an object body into pieces of at most `chunk_size` bytes.
///
/// At most one upstream chunk is held at a time. The client is released when
/// the body is exhausted, when a read fails (no chunk follows the error), or
/// when the caller drops the stream early.
pub(crate) fn chunked_download(
    client: Box<dyn ObjectStoreClient>,
    body: ByteStream,
    backup_id: &str,
    location: StoreLocation,
    chunk_size: usize,
) -> BackupStream {
    let state = DownloadState {
        connection: Some((client, body)),
        pending: Bytes::new(),
        chunk_size: chunk_size.max(1),
        backup_id: backup_id.to_string(),
        location,
        bytes_sent: 0,
        started: Instant::now(),
    };

    let stream = stream::unfold(state, |mut state| async move {
        while state.pending.is_empty() {
            let next = match state.connection.as_mut() {
                Some((_, body)) => body.next().await,
                None => return None,
            };

            match next {
                Some(Ok(bytes)) => state.pending = bytes,
                Some(Err(err)) => {
                    state.connection = None;
                    let error = AgentFault::from(err).normalize("download_backup");
                    return Some((Err(error), state));
                }
                None => {
                    state.connection = None;
                    tracing::info!(
                        backup_id = %state.backup_id,
                        bucket = %state.location.bucket,
                        key = %state.location.key,
                        size_bytes = state.bytes_sent,
                        duration_ms = state.started.elapsed().as_secs_f64() * 1000.0,
                        "Backup download complete"
                    );
                    return None;
                }
            }
        }

        let take = state.pending.len().min(state.chunk_size);
        let chunk = state.pending.split_to(take);
        state.bytes_sent += chunk.len() as u64;
        Some((Ok(chunk), state))
    });

    Box::pin(stream)
}
