//! HTTP handlers for the bucket lifecycle under `/bucket`.
//!
//! Mutating endpoints report a missing bucket as 400 (see [`AppError::masked`]).

use crate::{
    app::AppState,
    errors::AppError,
    handlers::extract::{JsonBody, QueryParams},
    models::{
        bucket::{Bucket, BucketPatch, CreateBucket, ListBucketsFilter},
        principal::Principal,
    },
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    fn json(message: &'static str) -> Json<Self> {
        Json(Self { message })
    }
}

/// `GET /bucket`
pub async fn list_buckets(
    State(state): State<AppState>,
    principal: Principal,
    QueryParams(filter): QueryParams<ListBucketsFilter>,
) -> Result<Json<Vec<Bucket>>, AppError> {
    let buckets = state.registry.list(&filter, &principal).await?;
    Ok(Json(buckets))
}

/// `GET /bucket/{id}`
pub async fn get_bucket(
    State(state): State<AppState>,
    principal: Principal,
    Path(bucket_id): Path<String>,
) -> Result<Json<Bucket>, AppError> {
    let bucket = state.registry.get(&bucket_id, &principal).await?;
    Ok(Json(bucket))
}

/// `POST /bucket`
pub async fn create_bucket(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(request): JsonBody<CreateBucket>,
) -> Result<Json<Bucket>, AppError> {
    let bucket = state
        .registry
        .create(request, &principal)
        .await
        .map_err(|err| AppError::from(err).masked())?;
    Ok(Json(bucket))
}

/// `PUT /bucket/{id}`
pub async fn update_bucket(
    State(state): State<AppState>,
    principal: Principal,
    Path(bucket_id): Path<String>,
    JsonBody(patch): JsonBody<BucketPatch>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .registry
        .update(&bucket_id, patch, &principal)
        .await
        .map_err(|err| AppError::from(err).masked())?;
    Ok(MessageResponse::json("Successfully updated"))
}

/// `DELETE /bucket/{id}`: only succeeds on an empty bucket.
pub async fn delete_bucket(
    State(state): State<AppState>,
    principal: Principal,
    Path(bucket_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .registry
        .delete(&bucket_id, &principal)
        .await
        .map_err(|err| AppError::from(err).masked())?;
    Ok(MessageResponse::json("Successfully deleted"))
}

/// `POST /bucket/{id}/empty`
pub async fn empty_bucket(
    State(state): State<AppState>,
    principal: Principal,
    Path(bucket_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .gateway
        .empty_bucket(&bucket_id, &principal)
        .await
        .map_err(|err| AppError::from(err).masked())?;
    Ok(MessageResponse::json("Successfully emptied"))
}
