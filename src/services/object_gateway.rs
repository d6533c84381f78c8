//! src/services/object_gateway.rs
//!
//! ObjectGateway: serves object reads, uploads, deletes and copies by
//! combining the bucket registry, the authorization engine, the conditional
//! request evaluator and the storage backend. Public buckets take a fast path
//! that skips authorization entirely.

use crate::{
    backend::{BackendError, DELETE_BATCH_SIZE, StorageBackend},
    models::{
        bucket::Bucket,
        object::{
            DEFAULT_CACHE_CONTROL, DEFAULT_MIMETYPE, ObjectMetadata, Preconditions, StoredObject,
            Validators,
        },
        principal::Principal,
    },
    services::{
        authorization::{Action, AuthorizationEngine, Resource},
        bucket_activity::{BucketActivity, WriteLease},
        bucket_registry::BucketRegistry,
        conditional::{self, Outcome},
        error::{GatewayError, GatewayResult},
    },
    validation::{ensure_key_safe, mime_type_allowed},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a read: either a body to stream or a bare revalidation.
#[derive(Debug)]
pub enum ObjectRead {
    Body(StoredObject),
    NotModified(Validators),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub upsert: bool,
}

#[derive(Clone)]
pub struct ObjectGateway {
    registry: BucketRegistry,
    backend: Arc<dyn StorageBackend>,
    engine: Arc<AuthorizationEngine>,
    activity: Arc<BucketActivity>,
}

impl ObjectGateway {
    pub fn new(
        registry: BucketRegistry,
        backend: Arc<dyn StorageBackend>,
        engine: Arc<AuthorizationEngine>,
        activity: Arc<BucketActivity>,
    ) -> Self {
        Self {
            registry,
            backend,
            engine,
            activity,
        }
    }

    async fn resolve(&self, bucket_id: &str) -> GatewayResult<Bucket> {
        self.registry
            .find(bucket_id)
            .await?
            .ok_or_else(|| GatewayError::BucketNotFound(bucket_id.to_string()))
    }

    fn lease(&self, bucket_id: &str) -> GatewayResult<WriteLease> {
        self.activity
            .begin_write(bucket_id)
            .map_err(|_| GatewayError::BucketBusy(bucket_id.to_string()))
    }

    /// Serve an object read.
    ///
    /// Preconditions go to the backend untouched. Whether the backend reports
    /// not-modified itself or the evaluator decides so from the returned
    /// metadata, the body stream is dropped unread and only the validators
    /// are returned.
    pub async fn get_object(
        &self,
        bucket_id: &str,
        key: &str,
        version: Option<&str>,
        principal: &Principal,
        preconditions: &Preconditions,
    ) -> GatewayResult<ObjectRead> {
        ensure_key_safe(key)?;
        let bucket = self.resolve(bucket_id).await?;

        if !bucket.public {
            self.engine
                .authorize(principal, Action::Read, &Resource::object(&bucket, key))?;
        }

        let object = match self
            .backend
            .get_object(&bucket.id, key, version, preconditions)
            .await
        {
            Ok(object) => object,
            Err(BackendError::NotModified(validators)) => {
                debug!(bucket = %bucket.id, key, "backend reported not modified");
                return Ok(ObjectRead::NotModified(validators));
            }
            Err(err) => return Err(err.into()),
        };

        if preconditions.is_empty() {
            return Ok(ObjectRead::Body(object));
        }
        match conditional::evaluate(preconditions, &object.metadata) {
            Outcome::Serve => Ok(ObjectRead::Body(object)),
            Outcome::NotModified => {
                debug!(bucket = %bucket.id, key, "object not modified");
                Ok(ObjectRead::NotModified(Validators::from(&object.metadata)))
            }
            Outcome::PreconditionFailed => Err(GatewayError::PreconditionFailed),
        }
    }

    /// Upload an object.
    ///
    /// Size and mime type restrictions are checked before any backend call.
    /// A write lease is held until the backend write completes so the bucket
    /// cannot be deleted underneath the upload.
    pub async fn upload_object(
        &self,
        bucket_id: &str,
        upload: UploadRequest,
        principal: &Principal,
    ) -> GatewayResult<ObjectMetadata> {
        ensure_key_safe(&upload.key)?;
        let _lease = self.lease(bucket_id)?;
        let bucket = self.resolve(bucket_id).await?;

        let mimetype = upload
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_MIMETYPE)
            .to_string();
        let cache_control = upload
            .cache_control
            .as_deref()
            .map(normalize_cache_control)
            .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string());

        if let Some(limit) = bucket.file_size_limit {
            let limit = u64::try_from(limit).unwrap_or(0);
            if upload.body.len() as u64 > limit {
                return Err(GatewayError::PayloadTooLarge { limit });
            }
        }
        if let Some(allowed) = bucket.allowed_mime_types.as_deref() {
            if !mime_type_allowed(allowed, &mimetype) {
                return Err(GatewayError::InvalidMimeType(mimetype));
            }
        }

        let resource = Resource::object(&bucket, &upload.key);
        self.engine.authorize(principal, Action::Create, &resource)?;

        match self.backend.head_object(&bucket.id, &upload.key).await {
            Ok(_) if !upload.upsert => {
                return Err(GatewayError::AlreadyExists(format!(
                    "{}/{}",
                    bucket.id, upload.key
                )));
            }
            Ok(_) => self.engine.authorize(principal, Action::Update, &resource)?,
            Err(BackendError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let metadata = self
            .backend
            .put_object(&bucket.id, &upload.key, upload.body, &mimetype, &cache_control)
            .await?;

        info!(bucket = %bucket.id, key = %upload.key, size = metadata.size, "object uploaded");
        Ok(metadata)
    }

    pub async fn delete_object(
        &self,
        bucket_id: &str,
        key: &str,
        principal: &Principal,
    ) -> GatewayResult<()> {
        ensure_key_safe(key)?;
        let bucket = self.resolve(bucket_id).await?;
        self.engine
            .authorize(principal, Action::Delete, &Resource::object(&bucket, key))?;

        self.backend.head_object(&bucket.id, key).await?;
        self.backend
            .delete_objects(&bucket.id, &[key.to_string()])
            .await?;

        info!(bucket = %bucket.id, key, "object deleted");
        Ok(())
    }

    /// Copy an object within a bucket. Needs read on the source (unless the
    /// bucket is public) and create on the destination.
    pub async fn copy_object(
        &self,
        bucket_id: &str,
        source_key: &str,
        destination_key: &str,
        principal: &Principal,
    ) -> GatewayResult<ObjectMetadata> {
        ensure_key_safe(source_key)?;
        ensure_key_safe(destination_key)?;
        let _lease = self.lease(bucket_id)?;
        let bucket = self.resolve(bucket_id).await?;

        if !bucket.public {
            self.engine
                .authorize(principal, Action::Read, &Resource::object(&bucket, source_key))?;
        }
        self.engine.authorize(
            principal,
            Action::Create,
            &Resource::object(&bucket, destination_key),
        )?;

        let metadata = self
            .backend
            .copy_object(&bucket.id, source_key, destination_key)
            .await?;

        info!(bucket = %bucket.id, source_key, destination_key, "object copied");
        Ok(metadata)
    }

    /// Empty a bucket through the registry's authorization rules.
    pub async fn empty_bucket(
        &self,
        bucket_id: &str,
        principal: &Principal,
    ) -> GatewayResult<usize> {
        self.registry.empty(bucket_id, principal).await
    }
}

/// Delete every object under `bucket_id`.
///
/// Keys are listed page by page and each page is deleted as one batch.
/// Failed batches don't stop the purge; they are summed and reported as a
/// single `EmptyFailed` once every page has been attempted. No retries.
pub(crate) async fn purge_bucket(
    backend: &dyn StorageBackend,
    bucket_id: &str,
) -> GatewayResult<usize> {
    let mut continuation: Option<String> = None;
    let mut attempted = 0usize;
    let mut failed = 0usize;

    loop {
        let page = backend
            .list_objects(bucket_id, "", continuation.as_deref(), DELETE_BATCH_SIZE)
            .await
            .map_err(|source| GatewayError::EmptyFailed {
                bucket: bucket_id.to_string(),
                source,
            })?;

        if !page.keys.is_empty() {
            attempted += page.keys.len();
            match backend.delete_objects(bucket_id, &page.keys).await {
                Ok(()) => {}
                Err(BackendError::PartialDelete { failed: n, .. }) => failed += n,
                Err(err) => {
                    warn!(bucket = bucket_id, error = %err, "batch delete failed");
                    failed += page.keys.len();
                }
            }
        }

        match page.next_token {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    if failed > 0 {
        return Err(GatewayError::EmptyFailed {
            bucket: bucket_id.to_string(),
            source: BackendError::PartialDelete {
                failed,
                total: attempted,
            },
        });
    }

    Ok(attempted)
}

/// Accept either a bare number of seconds or a full header value.
fn normalize_cache_control(value: &str) -> String {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        format!("max-age={value}")
    } else {
        value.to_string()
    }
}
