//! Storage backend abstraction.
//!
//! The gateway only ever talks to object bytes through [`StorageBackend`].
//! Bucket ids are logical: adapters decide how they map onto physical
//! storage (a key prefix inside one S3 bucket, a directory on disk, a map
//! entry in memory).

use crate::models::object::{ObjectMetadata, ObjectPage, Preconditions, StoredObject, Validators};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

pub mod file;
pub mod memory;
pub mod s3;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use s3::{S3Backend, S3Settings};

/// Largest batch accepted by a single `delete_objects` call.
pub const DELETE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("object not modified")]
    NotModified(Validators),
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("{failed} of {total} deletes failed")]
    PartialDelete { failed: usize, total: usize },
    #[error("storage request failed: {0}")]
    Request(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackendError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        BackendError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Fetch an object. `preconditions` must be honoured or ignored, never
    /// rewritten; adapters that can evaluate them report
    /// [`BackendError::NotModified`] / [`BackendError::PreconditionFailed`]
    /// without transferring the body.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
        preconditions: &Preconditions,
    ) -> BackendResult<StoredObject>;

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        cache_control: &str,
    ) -> BackendResult<ObjectMetadata>;

    /// Delete a batch of keys. Missing keys are not an error. Any key that
    /// could not be deleted fails the whole call with
    /// [`BackendError::PartialDelete`].
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> BackendResult<()>;

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> BackendResult<ObjectMetadata>;

    /// List keys in lexicographic order. `continuation` is the opaque
    /// `next_token` of a previous page.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> BackendResult<ObjectPage>;

    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}
