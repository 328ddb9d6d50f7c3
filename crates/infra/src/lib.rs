//! Infrastructure layer: configuration, persistence and application services.
//!
//! Two stores implement the same [`store::Store`] boundary: an in-memory store for
//! tests and development, and a Postgres store for deployments.

pub mod config;
pub mod error;
pub mod services;
pub mod store;


pub use config::{AppConfig, ConfigError, DatabaseConfig, LogFormat};
pub use error::{ServiceError, ServiceResult, StoreError, StoreResult};
