use anyhow::Result;
use std::{io::ErrorKind, path::Path, sync::Arc};
use storage_gateway::{
    AppState,
    backend::{FileBackend, S3Backend, StorageBackend},
    build_router,
    config::{AppConfig, BackendKind},
    db,
    services::{authorization::AuthorizationEngine, jwt::JwtVerifier},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-gateway with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::migrate(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    db::migrate(&db).await?;

    // --- Storage backend ---
    let backend: Arc<dyn StorageBackend> = match cfg.backend {
        BackendKind::File => {
            if !Path::new(&cfg.storage_dir).exists() {
                std::fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(FileBackend::new(&cfg.storage_dir))
        }
        BackendKind::S3 => Arc::new(S3Backend::connect(&cfg.s3).await?),
    };

    // --- Authorization rules ---
    let engine = match &cfg.policy_file {
        Some(path) => {
            let engine = AuthorizationEngine::from_file(path)?;
            tracing::info!("Loaded {} policy rules from {}", engine.rules().len(), path.display());
            engine
        }
        None => AuthorizationEngine::default(),
    };

    let state = AppState::new(
        db,
        backend,
        Arc::new(engine),
        Arc::new(JwtVerifier::new(&cfg.jwt_secret)),
        cfg.upload_limit,
    );
    let app = build_router(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
