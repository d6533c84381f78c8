//! src/services/bucket_registry.rs
//!
//! BucketRegistry: bucket metadata lifecycle backed by SQLite. Object bytes
//! are never touched here; emptiness questions and purges go through the
//! storage backend so the answer is never stale.

use crate::{
    backend::StorageBackend,
    models::{
        bucket::{Bucket, BucketPatch, BucketRow, CreateBucket, ListBucketsFilter},
        principal::Principal,
    },
    services::{
        authorization::{Action, AuthorizationEngine, Resource},
        bucket_activity::{BucketActivity, Contention},
        error::{GatewayError, GatewayResult},
        object_gateway::purge_bucket,
    },
    validation::validate_bucket_name,
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::{debug, info};

const BUCKET_COLUMNS: &str =
    "id, name, owner, public, file_size_limit, allowed_mime_types, created_at, updated_at";

#[derive(Clone)]
pub struct BucketRegistry {
    db: Arc<SqlitePool>,
    backend: Arc<dyn StorageBackend>,
    engine: Arc<AuthorizationEngine>,
    activity: Arc<BucketActivity>,
}

impl BucketRegistry {
    pub fn new(
        db: Arc<SqlitePool>,
        backend: Arc<dyn StorageBackend>,
        engine: Arc<AuthorizationEngine>,
        activity: Arc<BucketActivity>,
    ) -> Self {
        Self {
            db,
            backend,
            engine,
            activity,
        }
    }

    /// Fetch bucket metadata without any authorization check.
    pub async fn find(&self, bucket_id: &str) -> GatewayResult<Option<Bucket>> {
        let row = sqlx::query_as::<_, BucketRow>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets WHERE id = ?"
        ))
        .bind(bucket_id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(Bucket::try_from).transpose()?)
    }

    async fn require(&self, bucket_id: &str) -> GatewayResult<Bucket> {
        self.find(bucket_id)
            .await?
            .ok_or_else(|| GatewayError::BucketNotFound(bucket_id.to_string()))
    }

    /// List the buckets visible to `principal`.
    ///
    /// Pagination bounds are validated first. Search and ordering happen in
    /// SQL; authorization is applied per row before the page is cut so that
    /// offsets count only visible buckets.
    pub async fn list(
        &self,
        filter: &ListBucketsFilter,
        principal: &Principal,
    ) -> GatewayResult<Vec<Bucket>> {
        let limit = match filter.limit {
            Some(limit) if limit < 1 => {
                return Err(GatewayError::InvalidInput("limit must be >= 1".into()));
            }
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
            None => usize::MAX,
        };
        let offset = match filter.offset {
            Some(offset) if offset < 0 => {
                return Err(GatewayError::InvalidInput("offset must be >= 0".into()));
            }
            Some(offset) => usize::try_from(offset).unwrap_or(usize::MAX),
            None => 0,
        };
        let column = filter.sort_column.unwrap_or_default();
        let order = filter.sort_order.unwrap_or_default();

        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {BUCKET_COLUMNS} FROM buckets"));
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            builder.push(" WHERE instr(name, ");
            builder.push_bind(search.to_string());
            builder.push(") > 0");
        }
        builder.push(format!(
            " ORDER BY {} {}, id ASC",
            column.as_sql(),
            order.as_sql()
        ));

        let rows: Vec<BucketRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        let buckets = rows
            .into_iter()
            .map(Bucket::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let visible = buckets
            .into_iter()
            .filter(|bucket| {
                self.engine
                    .evaluate(principal, Action::List, &Resource::bucket(bucket))
                    .allowed
            })
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>();

        debug!(
            role = principal.role(),
            count = visible.len(),
            "listed buckets"
        );
        Ok(visible)
    }

    pub async fn get(&self, bucket_id: &str, principal: &Principal) -> GatewayResult<Bucket> {
        let bucket = self.require(bucket_id).await?;
        self.engine
            .authorize(principal, Action::Read, &Resource::bucket(&bucket))?;
        Ok(bucket)
    }

    /// Create a bucket.
    ///
    /// Validates the name (and id, which defaults to the name), then inserts
    /// the row. The table's unique constraints decide concurrent creates:
    /// exactly one insert wins, the others get `AlreadyExists`.
    pub async fn create(
        &self,
        request: CreateBucket,
        principal: &Principal,
    ) -> GatewayResult<Bucket> {
        validate_bucket_name(&request.name)?;
        let id = request.id.unwrap_or_else(|| request.name.clone());
        validate_bucket_name(&id)?;
        if request.file_size_limit.is_some_and(|limit| limit < 0) {
            return Err(GatewayError::InvalidInput(
                "file_size_limit must be a non-negative integer".into(),
            ));
        }

        self.engine
            .authorize(principal, Action::Create, &Resource::bucket_creation())?;

        let now = Utc::now();
        let bucket = Bucket {
            id,
            name: request.name,
            owner: principal.subject().map(str::to_string),
            public: request.public.unwrap_or(false),
            file_size_limit: request.file_size_limit,
            allowed_mime_types: request.allowed_mime_types,
            created_at: now,
            updated_at: now,
        };
        let mime_types = encode_mime_types(bucket.allowed_mime_types.as_ref())?;

        match sqlx::query(
            "INSERT INTO buckets
                (id, name, owner, public, file_size_limit, allowed_mime_types,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bucket.id)
        .bind(&bucket.name)
        .bind(&bucket.owner)
        .bind(bucket.public)
        .bind(bucket.file_size_limit)
        .bind(mime_types)
        .bind(bucket.created_at)
        .bind(bucket.updated_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => {
                info!(bucket = %bucket.id, public = bucket.public, "bucket created");
                Ok(bucket)
            }
            Err(err) if is_unique_violation(&err) => Err(GatewayError::AlreadyExists(bucket.name)),
            Err(err) => Err(err.into()),
        }
    }

    /// Update `public`, `file_size_limit` and `allowed_mime_types` in place.
    ///
    /// Each column is only written when present in the patch, in a single
    /// statement, so concurrent patches touching different fields don't
    /// clobber each other.
    pub async fn update(
        &self,
        bucket_id: &str,
        patch: BucketPatch,
        principal: &Principal,
    ) -> GatewayResult<()> {
        let bucket = self.require(bucket_id).await?;
        self.engine
            .authorize(principal, Action::Update, &Resource::bucket(&bucket))?;

        if let Some(Some(limit)) = patch.file_size_limit {
            if limit < 0 {
                return Err(GatewayError::InvalidInput(
                    "file_size_limit must be a non-negative integer".into(),
                ));
            }
        }

        let mime_types = match &patch.allowed_mime_types {
            Some(value) => encode_mime_types(value.as_ref())?,
            None => None,
        };

        let result = sqlx::query(
            "UPDATE buckets SET
                public = COALESCE(?, public),
                file_size_limit = CASE WHEN ? THEN ? ELSE file_size_limit END,
                allowed_mime_types = CASE WHEN ? THEN ? ELSE allowed_mime_types END,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(patch.public)
        .bind(patch.file_size_limit.is_some())
        .bind(patch.file_size_limit.flatten())
        .bind(patch.allowed_mime_types.is_some())
        .bind(mime_types)
        .bind(Utc::now())
        .bind(bucket_id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::BucketNotFound(bucket_id.to_string()));
        }

        info!(bucket = %bucket_id, "bucket updated");
        Ok(())
    }

    /// Delete an empty bucket.
    ///
    /// The bucket is marked as deleting before the backend is asked whether
    /// it holds objects, so no upload can start between the check and the row
    /// removal. The mark is released when the guard drops.
    pub async fn delete(&self, bucket_id: &str, principal: &Principal) -> GatewayResult<()> {
        let bucket = self.require(bucket_id).await?;
        self.engine
            .authorize(principal, Action::Delete, &Resource::bucket(&bucket))?;

        let _guard = self.activity.begin_delete(&bucket.id).map_err(|contention| match contention {
            Contention::Writers => GatewayError::BucketNotEmpty(bucket.id.clone()),
            Contention::Deleting => GatewayError::BucketBusy(bucket.id.clone()),
        })?;

        if !self.is_empty(&bucket.id).await? {
            return Err(GatewayError::BucketNotEmpty(bucket.id));
        }

        let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(&bucket.id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::BucketNotFound(bucket.id));
        }

        info!(bucket = %bucket.id, "bucket deleted");
        Ok(())
    }

    /// Remove every object in the bucket, keeping its metadata.
    ///
    /// Idempotent: an already-empty bucket succeeds without a delete call.
    pub async fn empty(&self, bucket_id: &str, principal: &Principal) -> GatewayResult<usize> {
        let bucket = self.require(bucket_id).await?;
        self.engine
            .authorize(principal, Action::Empty, &Resource::bucket(&bucket))?;

        let removed = purge_bucket(self.backend.as_ref(), &bucket.id).await?;
        info!(bucket = %bucket.id, removed, "bucket emptied");
        Ok(removed)
    }

    async fn is_empty(&self, bucket_id: &str) -> GatewayResult<bool> {
        let page = self.backend.list_objects(bucket_id, "", None, 1).await?;
        Ok(page.keys.is_empty())
    }
}

fn encode_mime_types(types: Option<&Vec<String>>) -> GatewayResult<Option<String>> {
    Ok(types.map(serde_json::to_string).transpose()?)
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
