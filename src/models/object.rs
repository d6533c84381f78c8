//! Object metadata and request preconditions.
//!
//! Object bytes never pass through this module; metadata is sourced from the
//! storage backend on every request and lives only as long as the request.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::{fmt, io};

pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";
pub const DEFAULT_CACHE_CONTROL: &str = "no-cache";

/// Metadata reported by the backend for a stored object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub size: u64,
    pub mimetype: String,
    pub e_tag: String,
    pub last_modified: DateTime<Utc>,
    pub cache_control: String,
    pub content_length: u64,
    pub http_status_code: u16,
}

/// Conditional request headers, forwarded to the backend exactly as parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_match: Option<String>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl Preconditions {
    pub fn is_empty(&self) -> bool {
        self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_match.is_none()
            && self.if_unmodified_since.is_none()
    }
}

/// Validators returned with a 304 response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Validators {
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<&ObjectMetadata> for Validators {
    fn from(meta: &ObjectMetadata) -> Self {
        Self {
            e_tag: Some(meta.e_tag.clone()),
            last_modified: Some(meta.last_modified),
        }
    }
}

/// Streaming object payload. Dropping it aborts the underlying fetch.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// An object fetched from the backend: metadata plus a not-yet-consumed body.
pub struct StoredObject {
    pub metadata: ObjectMetadata,
    pub body: ObjectBody,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// One page of keys from a backend listing.
#[derive(Clone, Debug, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn metadata_serializes_camel_case() {
        let meta = ObjectMetadata {
            size: 3,
            mimetype: "text/plain".into(),
            e_tag: "\"abc\"".into(),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            cache_control: "max-age=60".into(),
            content_length: 3,
            http_status_code: 200,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["eTag"], "\"abc\"");
        assert_eq!(value["httpStatusCode"], 200);
        assert_eq!(value["cacheControl"], "max-age=60");
        assert!(value.get("lastModified").is_some());
    }
}
