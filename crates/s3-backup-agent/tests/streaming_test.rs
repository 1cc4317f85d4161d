#[path = "helpers/mod.rs"]
mod helpers;

use futures::StreamExt;
use helpers::{envelope_headers, read_all, record, setup_agent_with};
use s3_backup_agent::BackupAgent;
use s3_backup_core::constants::DOWNLOAD_CHUNK_SIZE;
use s3_backup_storage::{MemoryConnector, StoreError, StoreErrorKind, StoreOp};

const UPSTREAM_CHUNK: usize = 64 * 1024;

fn synthetic_store(len: u64) -> MemoryConnector {
    let store = MemoryConnector::new("backups").with_body_chunk_size(UPSTREAM_CHUNK);
    store.insert_synthetic("big.tar", len, 0xAB, envelope_headers(&record("big", "large")));
    store
}

#[tokio::test]
async fn test_large_download_is_streamed_in_bounded_chunks() {
    let len: u64 = 64 * 1024 * 1024 + 123;
    let app = setup_agent_with(synthetic_store(len));

    let mut stream = app.agent.download_backup("big").await.unwrap();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert!(!chunk.is_empty());
        assert!(chunk.len() <= DOWNLOAD_CHUNK_SIZE);
        assert!(chunk.iter().all(|b| *b == 0xAB));
        received += chunk.len() as u64;

        // Never more than one upstream chunk ahead of what was handed out.
        let served = app.store.body_chunks_served();
        assert!(served <= received.div_ceil(UPSTREAM_CHUNK as u64) + 1);
    }

    assert_eq!(received, len);
    assert_eq!(app.store.open_handles(), 0);
}

#[tokio::test]
async fn test_abandoned_download_releases_connection() {
    let app = setup_agent_with(synthetic_store(1 << 40));

    let mut stream = app.agent.download_backup("big").await.unwrap();
    for _ in 0..3 {
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.len(), DOWNLOAD_CHUNK_SIZE);
    }
    assert_eq!(app.store.open_handles(), 1);
    assert_eq!(app.store.body_chunks_served(), 1);

    drop(stream);
    assert_eq!(app.store.open_handles(), 0);
}

#[tokio::test]
async fn test_download_can_start_before_transfer_completes() {
    let app = setup_agent_with(synthetic_store(10 * UPSTREAM_CHUNK as u64));

    let mut stream = app.agent.download_backup("big").await.unwrap();
    assert_eq!(app.store.body_chunks_served(), 0);

    stream.next().await.unwrap().unwrap();
    assert_eq!(app.store.body_chunks_served(), 1);
}

#[tokio::test]
async fn test_mid_stream_failure_ends_download() {
    let app = setup_agent_with(synthetic_store(4 * UPSTREAM_CHUNK as u64));

    let mut stream = app.agent.download_backup("big").await.unwrap();
    stream.next().await.unwrap().unwrap();

    app.store.fail_next(
        StoreOp::BodyRead,
        StoreError::new(StoreErrorKind::Network, "RequestTimeout", "connection reset"),
    );

    // Drain what was already fetched, then hit the fault.
    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        if let Err(e) = chunk {
            failure = Some(e);
            break;
        }
    }

    let err = failure.expect("download should fail");
    assert_eq!(err.operation_name(), Some("download_backup"));
    assert_eq!(err.code(), Some("RequestTimeout"));
    assert_eq!(app.store.open_handles(), 0);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_custom_chunk_size() {
    let store = MemoryConnector::new("backups");
    store.insert_object(
        "small.tar",
        bytes::Bytes::from_static(b"abcdefghij"),
        envelope_headers(&record("small", "small")),
    );
    let agent = s3_backup_agent::S3BackupAgent::new(
        s3_backup_agent::AgentIdentity::new("small", "s3://backups"),
        std::sync::Arc::new(store.clone()),
    )
    .with_chunk_size(3);

    let chunks: Vec<usize> = agent
        .download_backup("small")
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().len())
        .collect()
        .await;
    assert_eq!(chunks, vec![3, 3, 3, 1]);

    let body = read_all(agent.download_backup("small").await.unwrap())
        .await
        .unwrap();
    assert_eq!(body, b"abcdefghij");
}
