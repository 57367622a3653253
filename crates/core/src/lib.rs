//! Core domain models and business logic for Magnetarr
//!
//! This crate contains the fundamental domain models, the relevance filter,
//! the health/priority rules, and the repository traits the rest of the
//! workspace builds on.

pub mod domain;
pub mod error;
pub mod models;
pub mod relevance;
pub mod retry;

// Re-export core types
pub use domain::*;
pub use error::*;
pub use models::*;
pub use relevance::{significant_tokens, RelevanceConfig, RelevanceFilter};
pub use retry::{retry_transient, RetryConfig};
