//! Represents a logical bucket: a top-level container for objects and the
//! unit of authorization and visibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

/// A storage bucket as returned to clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Bucket {
    /// Immutable identifier. Defaults to the name at creation time.
    pub id: String,

    /// Display name, unique across all buckets (case-sensitive).
    pub name: String,

    /// `sub` claim of the principal that created the bucket.
    pub owner: Option<String>,

    /// Whether anonymous reads of objects are permitted.
    pub public: bool,

    /// Maximum object size in bytes.
    pub file_size_limit: Option<i64>,

    /// Mime types accepted for uploads. `type/*` wildcards are allowed.
    pub allowed_mime_types: Option<Vec<String>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `buckets` table. Mime types are stored as a JSON array.
#[derive(FromRow, Debug)]
pub(crate) struct BucketRow {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub public: bool,
    pub file_size_limit: Option<i64>,
    pub allowed_mime_types: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BucketRow> for Bucket {
    type Error = serde_json::Error;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        let allowed_mime_types = row
            .allowed_mime_types
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            public: row.public,
            file_size_limit: row.file_size_limit,
            allowed_mime_types,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Body of `POST /bucket`.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct CreateBucket {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub file_size_limit: Option<i64>,
    #[serde(default)]
    pub allowed_mime_types: Option<Vec<String>>,
}

/// Body of `PUT /bucket/{id}`.
///
/// The nullable fields use a double option: absent leaves the column alone,
/// an explicit `null` clears it.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct BucketPatch {
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub file_size_limit: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub allowed_mime_types: Option<Option<Vec<String>>>,
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Name,
    Id,
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortColumn::Name => "name",
            SortColumn::Id => "id",
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query string of `GET /bucket`.
///
/// `limit` and `offset` are kept signed so out-of-range values reach
/// validation instead of failing deserialization.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListBucketsFilter {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub search: Option<String>,
    pub sort_column: Option<SortColumn>,
    pub sort_order: Option<SortOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let patch: BucketPatch =
            serde_json::from_str(r#"{"file_size_limit": null}"#).expect("valid patch");
        assert_eq!(patch.file_size_limit, Some(None));
        assert_eq!(patch.allowed_mime_types, None);
        assert_eq!(patch.public, None);

        let patch: BucketPatch =
            serde_json::from_str(r#"{"public": true, "allowed_mime_types": ["image/*"]}"#)
                .expect("valid patch");
        assert_eq!(patch.public, Some(true));
        assert_eq!(
            patch.allowed_mime_types,
            Some(Some(vec!["image/*".to_string()]))
        );
    }

    #[test]
    fn filter_reads_camel_case_query() {
        let filter: ListBucketsFilter = serde_json::from_str(
            r#"{"limit": 1, "offset": 2, "sortColumn": "created_at", "sortOrder": "desc"}"#,
        )
        .expect("valid filter");
        assert_eq!(filter.limit, Some(1));
        assert_eq!(filter.offset, Some(2));
        assert_eq!(filter.sort_column, Some(SortColumn::CreatedAt));
        assert_eq!(filter.sort_order, Some(SortOrder::Desc));
    }

    #[test]
    fn row_decodes_mime_types() {
        let now = Utc::now();
        let row = BucketRow {
            id: "avatars".into(),
            name: "avatars".into(),
            owner: Some("user-1".into()),
            public: false,
            file_size_limit: Some(1024),
            allowed_mime_types: Some(r#"["image/png","image/jpeg"]"#.into()),
            created_at: now,
            updated_at: now,
        };
        let bucket = Bucket::try_from(row).expect("row converts");
        assert_eq!(
            bucket.allowed_mime_types,
            Some(vec!["image/png".to_string(), "image/jpeg".to_string()])
        );
    }
}
