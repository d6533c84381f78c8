//! Core gateway services: authorization, bucket metadata and object access.

pub mod authorization;
pub mod bucket_activity;
pub mod bucket_registry;
pub mod conditional;
pub mod error;
pub mod jwt;
pub mod object_gateway;

pub use error::{GatewayError, GatewayResult};
