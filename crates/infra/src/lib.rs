//! Infrastructure layer: stores, schema, configuration, seed and services.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use bootstrap::{SeedOutcome, seed};
pub use config::{AdminSeed, AppConfig, ConfigError};
pub use error::{ServiceError, ServiceResult, StoreError, StoreResult};
pub use services::Services;
pub use store::{InMemoryStore, PostgresStore, Store};

#[cfg(test)]
mod integration_tests;
