//! Object store abstraction used by the release pipeline

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A current (non-deleted) object as returned by a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    /// Normalised ETag (quotes stripped); MD5 hex for single-part uploads
    pub etag: Option<String>,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One entry of an object's version history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub last_modified: Option<DateTime<Utc>>,
    /// Exactly one version per key is current
    pub is_latest: bool,
    pub is_delete_marker: bool,
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PutRequest {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub cache_control: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    pub version_id: Option<String>,
    pub etag: Option<String>,
}

/// Versioned object store holding the site origin
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket every call targets
    fn bucket(&self) -> &str;

    /// Confirm the bucket exists and is reachable
    async fn head_bucket(&self) -> Result<(), StorageError>;

    /// List every current object in the bucket
    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StorageError>;

    async fn put_object(&self, request: PutRequest) -> Result<PutOutcome, StorageError>;

    /// Delete an object; on a versioned bucket this writes a delete marker and
    /// returns its version id
    async fn delete_object(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Version history for a single key, newest first
    async fn list_object_versions(&self, key: &str) -> Result<Vec<ObjectVersion>, StorageError>;

    /// Make a prior version current again by copying it on top of the key
    async fn restore_version(&self, key: &str, version_id: &str)
        -> Result<PutOutcome, StorageError>;
}

/// Strip the surrounding quotes S3 puts around ETags
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_ascii_lowercase()
}

/// ETag S3 assigns to a single-part, non-KMS upload of `body`
pub fn content_etag(body: &[u8]) -> String {
    format!("{:x}", md5::compute(body))
}

/// Order a version history newest first
///
/// Timestamps have one-second resolution, so a put and a delete in the same
/// second tie; the current version always sorts ahead of them.
pub fn sort_newest_first(versions: &mut [ObjectVersion]) {
    versions.sort_by(|a, b| {
        b.is_latest
            .cmp(&a.is_latest)
            .then_with(|| b.last_modified.cmp(&a.last_modified))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn version(id: &str, secs: i64, is_latest: bool, is_delete_marker: bool) -> ObjectVersion {
        ObjectVersion {
            key: "index.html".to_string(),
            version_id: id.to_string(),
            last_modified: Utc.timestamp_opt(secs, 0).single(),
            is_latest,
            is_delete_marker,
            etag: None,
        }
    }

    #[test]
    fn test_latest_wins_a_same_second_tie() {
        // Listed the way ListObjectVersions pages them: versions, then delete markers
        let mut versions = vec![
            version("v1", 1_700_000_000, false, false),
            version("v2", 1_700_000_060, false, false),
            version("d1", 1_700_000_060, true, true),
        ];

        sort_newest_first(&mut versions);

        let ids: Vec<&str> = versions.iter().map(|v| v.version_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "v2", "v1"]);
        assert!(versions[0].is_latest);
    }

    #[test]
    fn test_normalize_etag() {
        assert_eq!(
            normalize_etag("\"D41D8CD98F00B204E9800998ECF8427E\""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(normalize_etag("abc-2"), "abc-2");
    }

    #[test]
    fn test_content_etag_is_md5_hex() {
        assert_eq!(content_etag(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
