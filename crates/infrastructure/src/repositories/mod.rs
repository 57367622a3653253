//! Repository implementations backed by PostgreSQL

pub mod health;
pub mod sessions;

pub use health::PostgresHealthStore;
pub use sessions::PostgresSessionStore;
