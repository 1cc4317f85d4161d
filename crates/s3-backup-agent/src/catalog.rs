//! Catalog resolution
//!
//! The catalog is never stored. Every query pages through the whole bucket,
//! reads each object's metadata header and keeps the objects whose envelope
//! carries the expected version tag. Header reads are issued one at a time.
//!
//! Duplicate backup ids resolve to the first object in listing order, for
//! both [`list`] and [`resolve`], so the two always agree.

use std::collections::HashSet;
use std::ops::ControlFlow;

use s3_backup_core::{BackupRecord, MetadataEnvelope, StoreLocation};
use s3_backup_storage::{ObjectHead, ObjectStoreClient};

use crate::errors::AgentFault;

/// A bucket object recognized as a backup
#[derive(Debug)]
pub(crate) struct CatalogEntry {
    pub(crate) location: StoreLocation,
    pub(crate) head: ObjectHead,
    pub(crate) envelope: MetadataEnvelope,
}

impl CatalogEntry {
    pub(crate) fn record(&self) -> Result<BackupRecord, AgentFault> {
        self.envelope.record().map_err(|source| AgentFault::Decode {
            key: self.location.key.clone(),
            source,
        })
    }
}

/// Visit every backup object in listing order until `visit` breaks.
async fn scan<F>(client: &dyn ObjectStoreClient, mut visit: F) -> Result<(), AgentFault>
where
    F: FnMut(CatalogEntry) -> ControlFlow<()> + Send,
{
    let mut start_after: Option<String> = None;

    loop {
        let page = client.list_page(start_after.as_deref()).await?;

        for object in page.entries {
            let head = match client.head_object(&object.key).await {
                Ok(head) => head,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(key = %object.key, "Object removed during catalog scan");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let Some(envelope) = MetadataEnvelope::from_headers(&head.metadata) else {
                tracing::debug!(key = %object.key, "Skipping object without backup metadata");
                continue;
            };

            let entry = CatalogEntry {
                location: StoreLocation::new(client.bucket(), object.key),
                head,
                envelope,
            };
            if visit(entry).is_break() {
                return Ok(());
            }
        }

        match page.next_start_after {
            Some(next) => start_after = Some(next),
            None => return Ok(()),
        }
    }
}

/// All backups in the bucket. The order follows the store listing and is
/// not guaranteed to be stable between calls.
pub(crate) async fn list(client: &dyn ObjectStoreClient) -> Result<Vec<BackupRecord>, AgentFault> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();

    scan(client, |entry| {
        if !seen.insert(entry.envelope.backup_id.clone()) {
            tracing::warn!(
                backup_id = %entry.envelope.backup_id,
                key = %entry.location.key,
                "Duplicate backup id, keeping the first object in listing order"
            );
            return ControlFlow::Continue(());
        }

        match entry.record() {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                error = %e,
                key = %entry.location.key,
                "Skipping backup with unreadable metadata"
            ),
        }
        ControlFlow::Continue(())
    })
    .await?;

    Ok(records)
}

/// The first backup object carrying `backup_id`.
pub(crate) async fn resolve(
    client: &dyn ObjectStoreClient,
    backup_id: &str,
) -> Result<CatalogEntry, AgentFault> {
    let mut found = None;

    scan(client, |entry| {
        if entry.envelope.backup_id == backup_id {
            found = Some(entry);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .await?;

    match found {
        Some(entry) => {
            tracing::debug!(backup_id, location = %entry.location, "Resolved backup");
            Ok(entry)
        }
        None => Err(AgentFault::NotFound(backup_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use s3_backup_storage::{MemoryConnector, StoreConnector, StoreError, StoreOp};
    use std::collections::HashMap;

    fn headers(backup_id: &str, name: &str) -> HashMap<String, String> {
        let record = BackupRecord::new(
            backup_id,
            name,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        MetadataEnvelope::for_record(&record).unwrap().into_headers()
    }

    #[tokio::test]
    async fn test_list_skips_foreign_objects() {
        let connector = MemoryConnector::new("backups").with_list_page_size(2);
        connector.insert_object("a.tar", Bytes::from_static(b"a"), headers("a", "first"));
        connector.insert_object("notes.txt", Bytes::from_static(b"n"), HashMap::new());
        let mut future_version = headers("f", "future");
        future_version.insert("metadata_version".to_string(), "2".to_string());
        connector.insert_object("f.tar", Bytes::from_static(b"f"), future_version);
        connector.insert_object("z.tar", Bytes::from_static(b"z"), headers("z", "last"));

        let client = connector.connect().await.unwrap();
        let records = list(client.as_ref()).await.unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.backup_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z"]);
    }

    #[tokio::test]
    async fn test_resolve_short_circuits() {
        let connector = MemoryConnector::new("backups").with_list_page_size(1);
        connector.insert_object("a.tar", Bytes::from_static(b"a"), headers("a", "first"));
        connector.insert_object("b.tar", Bytes::from_static(b"b"), headers("b", "second"));
        let client = connector.connect().await.unwrap();

        let entry = resolve(client.as_ref(), "a").await.unwrap();
        assert_eq!(entry.location, StoreLocation::new("backups", "a.tar"));
        assert_eq!(entry.head.size, 1);
        assert_eq!(connector.call_count(StoreOp::List), 1);
        assert_eq!(connector.call_count(StoreOp::Head), 1);

        let entry = resolve(client.as_ref(), "b").await.unwrap();
        assert_eq!(entry.location.key, "b.tar");
        assert_eq!(connector.call_count(StoreOp::List), 3);
        assert_eq!(connector.call_count(StoreOp::Head), 3);
    }

    #[tokio::test]
    async fn test_scan_fault_propagates() {
        let connector = MemoryConnector::new("backups");
        connector.insert_object("a.tar", Bytes::from_static(b"a"), headers("a", "first"));
        connector.fail_next(StoreOp::Head, StoreError::access_denied("Access Denied"));

        let client = connector.connect().await.unwrap();
        let err = resolve(client.as_ref(), "a").await.unwrap_err();
        assert!(matches!(err, AgentFault::Store(ref e) if e.code == "AccessDenied"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id() {
        let connector = MemoryConnector::new("backups");
        connector.insert_object("a.tar", Bytes::from_static(b"a"), headers("a", "first"));

        let client = connector.connect().await.unwrap();
        let err = resolve(client.as_ref(), "missing").await.unwrap_err();
        assert!(matches!(err, AgentFault::NotFound(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_in_listing_order() {
        let connector = MemoryConnector::new("backups");
        connector.insert_object("a.tar", Bytes::from_static(b"a"), headers("dup", "older"));
        connector.insert_object("b.tar", Bytes::from_static(b"b"), headers("dup", "newer"));

        let client = connector.connect().await.unwrap();
        let records = list(client.as_ref()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "older");

        let entry = resolve(client.as_ref(), "dup").await.unwrap();
        assert_eq!(entry.location.key, "a.tar");
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_records() {
        let connector = MemoryConnector::new("backups");
        let mut broken = headers("broken", "broken");
        broken.insert("backup_metadata".to_string(), "{not json".to_string());
        connector.insert_object("a.tar", Bytes::from_static(b"a"), broken);
        connector.insert_object("b.tar", Bytes::from_static(b"b"), headers("ok", "fine"));

        let client = connector.connect().await.unwrap();
        let records = list(client.as_ref()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].backup_id, "ok");

        let entry = resolve(client.as_ref(), "broken").await.unwrap();
        assert!(matches!(entry.record(), Err(AgentFault::Decode { .. })));
    }

    #[tokio::test]
    async fn test_vanished_object_is_skipped() {
        let connector = MemoryConnector::new("backups");
        connector.insert_object("a.tar", Bytes::from_static(b"a"), headers("a", "gone"));
        connector.insert_object("b.tar", Bytes::from_static(b"b"), headers("b", "kept"));
        connector.fail_next(StoreOp::Head, StoreError::not_found("a.tar"));

        let client = connector.connect().await.unwrap();
        let records = list(client.as_ref()).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.backup_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }
}
