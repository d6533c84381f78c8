//! Defines routes for the bucket and object APIs.
//!
//! ## Structure
//! - **Bucket endpoints**
//!   - `GET    /bucket`: list visible buckets (limit, offset, search, sortColumn, sortOrder)
//!   - `POST   /bucket`: create bucket
//!   - `GET    /bucket/{id}`: fetch one bucket
//!   - `PUT    /bucket/{id}`: update public flag and upload restrictions
//!   - `DELETE /bucket/{id}`: delete an empty bucket
//!   - `POST   /bucket/{id}/empty`: delete every object in the bucket
//!
//! - **Object endpoints**
//!   - `GET    /object/public/{bucket}/{*key}`: anonymous read from a public bucket
//!   - `GET    /object/authenticated/{bucket}/{*key}`: bearer-authenticated read
//!   - `POST   /object/{bucket}/{*key}`: upload (overwrite with `x-upsert: true`)
//!   - `PUT    /object/{bucket}/{*key}`: upload, overwriting
//!   - `DELETE /object/{bucket}/{*key}`: delete object
//!   - `POST   /object/copy`: copy within a bucket
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    app::AppState,
    handlers::{
        bucket_handlers::{
            create_bucket, delete_bucket, empty_bucket, get_bucket, list_buckets, update_bucket,
        },
        health_handlers::{healthz, readyz},
        object_handlers::{
            copy_object, delete_object, get_authenticated_object, get_public_object, upload_object,
        },
    },
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router carrying `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket routes
        .route("/bucket", get(list_buckets).post(create_bucket))
        .route(
            "/bucket/{id}",
            get(get_bucket).put(update_bucket).delete(delete_bucket),
        )
        .route("/bucket/{id}/empty", post(empty_bucket))
        // Object routes
        .route("/object/copy", post(copy_object))
        .route("/object/public/{bucket}/{*key}", get(get_public_object))
        .route(
            "/object/authenticated/{bucket}/{*key}",
            get(get_authenticated_object),
        )
        .route(
            "/object/{bucket}/{*key}",
            post(upload_object).put(upload_object).delete(delete_object),
        )
}
