//! Backup domain models
//!
//! A [`BackupRecord`] describes one logical backup. It is persisted nowhere
//! except inside the [`MetadataEnvelope`] attached to the object holding the
//! backup bytes, so the catalog can always be rebuilt from the bucket alone.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter as JsonFormatter;
use serde_json::{Map, Value};

use crate::constants::{
    BACKUP_ID_KEY, BACKUP_METADATA_KEY, METADATA_VERSION, METADATA_VERSION_KEY,
};

/// One logical backup as known to the host application.
///
/// Only `backup_id`, `name` and `date` are interpreted by the agent. Any other
/// fields the host attaches are kept verbatim in `extra` and round-trip
/// through the object metadata unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub protected: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BackupRecord {
    pub fn new(backup_id: impl Into<String>, name: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            backup_id: backup_id.into(),
            name: name.into(),
            date,
            size: 0,
            protected: false,
            extra: Map::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// Attach an opaque host-defined field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Serialize the record as ASCII-only JSON.
    ///
    /// Non-ASCII characters are written as `\uXXXX` escapes so the result is
    /// a valid object metadata header value. Fails when an `extra` field
    /// shadows one of the named fields, since such a record could not be read
    /// back.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        if let Some(key) = self.extra.keys().find(|key| RECORD_FIELDS.contains(&key.as_str())) {
            return Err(serde_json::Error::custom(format!(
                "extra field `{}` shadows a backup record field",
                key
            )));
        }
        to_ascii_json(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Field names `extra` must not reuse.
const RECORD_FIELDS: [&str; 5] = ["backup_id", "name", "date", "size", "protected"];

/// JSON formatter escaping every non-ASCII character as `\uXXXX`.
struct AsciiFormatter;

impl JsonFormatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

fn to_ascii_json<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(serde_json::Error::custom)
}

/// Header form of a backup id: the body of its ASCII JSON string literal.
fn encode_header_id(backup_id: &str) -> String {
    let mut encoded = String::with_capacity(backup_id.len());
    for c in backup_id.chars() {
        match c {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => encoded.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    encoded.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    encoded
}

fn decode_header_id(raw: &str) -> Option<String> {
    serde_json::from_str(&format!("\"{}\"", raw)).ok()
}

/// Self-describing header attached to every object written by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEnvelope {
    pub backup_id: String,
    /// Serialized [`BackupRecord`].
    pub backup_metadata: String,
}

impl MetadataEnvelope {
    pub fn for_record(record: &BackupRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            backup_id: record.backup_id.clone(),
            backup_metadata: record.to_json()?,
        })
    }

    /// Render the envelope as object metadata headers, version tag included.
    ///
    /// Every value is ASCII. A non-ASCII backup id is written with JSON
    /// string escapes and decoded again by [`MetadataEnvelope::from_headers`].
    pub fn into_headers(self) -> HashMap<String, String> {
        HashMap::from([
            (METADATA_VERSION_KEY.to_string(), METADATA_VERSION.to_string()),
            (BACKUP_ID_KEY.to_string(), encode_header_id(&self.backup_id)),
            (BACKUP_METADATA_KEY.to_string(), self.backup_metadata),
        ])
    }

    /// Read an envelope back from object metadata.
    ///
    /// Returns `None` for objects this agent did not write: a missing or
    /// different version tag, or a missing id or record field.
    pub fn from_headers(headers: &HashMap<String, String>) -> Option<Self> {
        if headers.get(METADATA_VERSION_KEY).map(String::as_str) != Some(METADATA_VERSION) {
            return None;
        }

        Some(Self {
            backup_id: decode_header_id(headers.get(BACKUP_ID_KEY)?)?,
            backup_metadata: headers.get(BACKUP_METADATA_KEY)?.clone(),
        })
    }

    pub fn record(&self) -> Result<BackupRecord, serde_json::Error> {
        BackupRecord::from_json(&self.backup_metadata)
    }
}

/// Where the bytes of one backup live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLocation {
    pub bucket: String,
    pub key: String,
}

impl StoreLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Display for StoreLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> BackupRecord {
        BackupRecord::new("abc", "nightly", Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
            .with_size(10)
            .with_extra("homeassistant_version", json!("2025.1.0"))
            .with_extra("folders", json!(["media", "share"]))
    }

    #[test]
    fn record_keeps_unknown_fields() {
        let record = sample();
        let raw = record.to_json().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["homeassistant_version"], json!("2025.1.0"));
        assert_eq!(value["backup_id"], json!("abc"));

        assert_eq!(BackupRecord::from_json(&raw).unwrap(), record);
    }

    #[test]
    fn record_defaults_optional_fields() {
        let record = BackupRecord::from_json(
            r#"{"backup_id":"x","name":"n","date":"2025-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(record.size, 0);
        assert!(!record.protected);
        assert!(record.extra.is_empty());
    }

    #[test]
    fn envelope_headers_carry_version_tag() {
        let headers = MetadataEnvelope::for_record(&sample()).unwrap().into_headers();
        assert_eq!(headers.get("metadata_version").unwrap(), "1");
        assert_eq!(headers.get("backup_id").unwrap(), "abc");

        let envelope = MetadataEnvelope::from_headers(&headers).unwrap();
        assert_eq!(envelope.record().unwrap(), sample());
    }

    #[test]
    fn envelope_rejects_foreign_headers() {
        let mut headers = MetadataEnvelope::for_record(&sample()).unwrap().into_headers();
        headers.insert("metadata_version".to_string(), "2".to_string());
        assert!(MetadataEnvelope::from_headers(&headers).is_none());

        headers.remove("metadata_version");
        assert!(MetadataEnvelope::from_headers(&headers).is_none());

        assert!(MetadataEnvelope::from_headers(&HashMap::new()).is_none());

        let partial = HashMap::from([("metadata_version".to_string(), "1".to_string())]);
        assert!(MetadataEnvelope::from_headers(&partial).is_none());
    }

    #[test]
    fn envelope_headers_are_ascii_for_unicode_records() {
        let record = BackupRecord::new(
            "sauvegarde-\u{e9}t\u{e9} \"v2\"",
            "Sauvegarde compl\u{e8}te \u{1f4be}",
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        )
        .with_extra("note", json!("\u{65e5}\u{672c}"));

        let headers = MetadataEnvelope::for_record(&record).unwrap().into_headers();
        for (name, value) in &headers {
            assert!(value.is_ascii(), "header {name} is not ASCII: {value}");
        }
        assert!(headers["backup_metadata"].contains("compl\\u00e8te"));
        assert!(headers["backup_metadata"].contains("\\ud83d\\udcbe"));

        let envelope = MetadataEnvelope::from_headers(&headers).unwrap();
        assert_eq!(envelope.backup_id, record.backup_id);
        assert_eq!(envelope.record().unwrap(), record);
    }

    #[test]
    fn escaped_looking_ids_stay_distinct() {
        let date = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let literal = BackupRecord::new("a\\u00e9", "n", date);
        let unicode = BackupRecord::new("a\u{e9}", "n", date);

        let literal_headers = MetadataEnvelope::for_record(&literal).unwrap().into_headers();
        let unicode_headers = MetadataEnvelope::for_record(&unicode).unwrap().into_headers();
        assert_ne!(literal_headers["backup_id"], unicode_headers["backup_id"]);

        assert_eq!(
            MetadataEnvelope::from_headers(&literal_headers).unwrap().backup_id,
            "a\\u00e9"
        );
        assert_eq!(
            MetadataEnvelope::from_headers(&unicode_headers).unwrap().backup_id,
            "a\u{e9}"
        );
    }

    #[test]
    fn extra_fields_cannot_shadow_record_fields() {
        for field in ["backup_id", "name", "date", "size", "protected"] {
            let record = sample().with_extra(field, json!("shadow"));
            let err = record.to_json().unwrap_err();
            assert!(err.to_string().contains(field), "{err}");
            assert!(MetadataEnvelope::for_record(&record).is_err());
        }
    }

    #[test]
    fn location_displays_as_url() {
        let location = StoreLocation::new("backups", "nightly.tar");
        assert_eq!(location.to_string(), "s3://backups/nightly.tar");
    }
}
