//! Magnetarr infrastructure
//!
//! Concrete implementations of the repository traits defined in the core
//! domain layer (PostgreSQL health and session stores), the metadata
//! resolver client, and in-process caching.

pub mod cache;
pub mod cinemeta;
pub mod database;
pub mod error;
pub mod repositories;

// Re-export for easy access
pub use cache::MemoryCache;
pub use cinemeta::CinemetaClient;
pub use database::{apply_schema, create_pool, DatabaseConfig, DatabasePool};
pub use error::InfrastructureError;
pub use repositories::{PostgresHealthStore, PostgresSessionStore};
