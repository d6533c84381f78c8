//! Core data models for the storage gateway.
//!
//! Buckets map to the `buckets` table via `sqlx::FromRow`; object metadata is
//! only ever sourced from the storage backend. Everything serializes as JSON
//! via `serde`.

pub mod bucket;
pub mod object;
pub mod principal;
