//! Shared key generation for storage backends.
//!
//! Key format: `{slug(name)}_{YYYY-MM-DD_HH.MM_SSffffff}.tar`, flat at the bucket root.

use s3_backup_core::BackupRecord;

/// Derive the object key for a backup.
///
/// The key depends only on the record's name and timestamp, so uploading the
/// same backup twice overwrites the first object instead of duplicating it.
pub fn suggested_filename(record: &BackupRecord) -> String {
    format!(
        "{}_{}.tar",
        slugify(&record.name),
        record.date.format("%Y-%m-%d_%H.%M_%S%6f")
    )
}

/// Lowercase ASCII alphanumerics; every other run of characters becomes `_`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        "backup".to_string()
    } else {
        slug
    }
}
