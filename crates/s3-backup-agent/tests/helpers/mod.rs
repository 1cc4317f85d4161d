#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use futures::StreamExt;
use s3_backup_agent::{AgentIdentity, BackupResult, BackupStream, S3BackupAgent};
use s3_backup_core::{BackupRecord, MetadataEnvelope};
use s3_backup_storage::MemoryConnector;

/// Agent wired to an in-memory bucket, with direct access to the bucket.
pub struct TestAgent {
    pub agent: S3BackupAgent,
    pub store: MemoryConnector,
}

/// Small listing pages so every test also exercises pagination.
pub fn setup_agent() -> TestAgent {
    setup_agent_with(MemoryConnector::new("backups").with_list_page_size(2))
}

pub fn setup_agent_with(store: MemoryConnector) -> TestAgent {
    let agent = S3BackupAgent::new(
        AgentIdentity::new("Test bucket", "s3://backups"),
        Arc::new(store.clone()),
    );
    TestAgent { agent, store }
}

/// Record with a fixed timestamp offset by `minute`, so keys are predictable.
pub fn record_at(backup_id: &str, name: &str, minute: i64) -> BackupRecord {
    let date = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap() + Duration::minutes(minute);
    BackupRecord::new(backup_id, name, date)
}

pub fn record(backup_id: &str, name: &str) -> BackupRecord {
    record_at(backup_id, name, 0)
}

pub fn envelope_headers(record: &BackupRecord) -> HashMap<String, String> {
    MetadataEnvelope::for_record(record).unwrap().into_headers()
}

/// Objects that share the bucket but were not written by the agent.
pub fn seed_foreign_objects(store: &MemoryConnector) {
    store.insert_object("README.md", Bytes::from_static(b"not a backup"), HashMap::new());
    store.insert_object(
        "other-tool/archive.tar",
        Bytes::from_static(b"someone else's archive"),
        HashMap::from([("owner".to_string(), "other-tool".to_string())]),
    );

    let mut newer_format = envelope_headers(&record("foreign", "from the future"));
    newer_format.insert("metadata_version".to_string(), "2".to_string());
    store.insert_object("future.tar", Bytes::from_static(b"v2"), newer_format);
}

pub async fn read_all(stream: BackupStream) -> BackupResult<Vec<u8>> {
    let mut stream = stream;
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}
