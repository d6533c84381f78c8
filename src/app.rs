//! Shared application state handed to every handler.

use crate::{
    backend::StorageBackend,
    routes,
    services::{
        authorization::AuthorizationEngine, bucket_activity::BucketActivity,
        bucket_registry::BucketRegistry, jwt::JwtVerifier, object_gateway::ObjectGateway,
    },
};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Default cap on a buffered upload body.
pub const DEFAULT_UPLOAD_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registry: BucketRegistry,
    pub gateway: ObjectGateway,
    pub verifier: Arc<JwtVerifier>,
    pub db: Arc<SqlitePool>,
    pub backend: Arc<dyn StorageBackend>,
    pub upload_limit: usize,
}

impl AppState {
    /// Wire the services together. The registry and gateway share one
    /// activity tracker so uploads and bucket deletes see each other.
    pub fn new(
        db: Arc<SqlitePool>,
        backend: Arc<dyn StorageBackend>,
        engine: Arc<AuthorizationEngine>,
        verifier: Arc<JwtVerifier>,
        upload_limit: usize,
    ) -> Self {
        let activity = BucketActivity::new();
        let registry = BucketRegistry::new(
            db.clone(),
            backend.clone(),
            engine.clone(),
            activity.clone(),
        );
        let gateway = ObjectGateway::new(registry.clone(), backend.clone(), engine, activity);

        Self {
            registry,
            gateway,
            verifier,
            db,
            backend,
            upload_limit,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    routes::routes().with_state(state)
}
