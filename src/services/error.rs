//! Errors produced by the bucket registry and object gateway.
//!
//! HTTP mapping lives in `crate::errors`; nothing here knows about status
//! codes.

use crate::backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Bucket name invalid")]
    InvalidBucketName,
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("{0}")]
    InvalidInput(String),
    /// Carries the denial reason for logs only; never shown to clients.
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("Bucket not found")]
    BucketNotFound(String),
    #[error("Object not found")]
    ObjectNotFound { bucket: String, key: String },
    #[error("The resource already exists")]
    AlreadyExists(String),
    #[error("The bucket you tried to delete is not empty")]
    BucketNotEmpty(String),
    #[error("Bucket `{0}` is being modified by another request")]
    BucketBusy(String),
    #[error("The object exceeded the maximum allowed size")]
    PayloadTooLarge { limit: u64 },
    #[error("mime type {0} is not supported")]
    InvalidMimeType(String),
    #[error("At least one of the preconditions you specified did not hold")]
    PreconditionFailed,
    #[error("failed to empty bucket `{bucket}`: {source}")]
    EmptyFailed {
        bucket: String,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Backend(BackendError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt bucket metadata: {0}")]
    CorruptMetadata(#[from] serde_json::Error),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound { bucket, key } => GatewayError::ObjectNotFound { bucket, key },
            BackendError::PreconditionFailed => GatewayError::PreconditionFailed,
            other => GatewayError::Backend(other),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
