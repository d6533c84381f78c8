//! Authorization-aware storage gateway.
//!
//! Buckets live in SQLite, object bytes in a pluggable [`backend::StorageBackend`],
//! and every request is checked against a rule table before bytes move.

pub mod app;
pub mod backend;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod validation;

pub use app::{AppState, build_router};
