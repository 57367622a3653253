//! Repository traits implemented by the infrastructure crate
//!
//! Per-row consistency is all that is required of implementations;
//! transactions are not. The probe loop is sequential, so there is at most
//! one writer per health row at a time.

use crate::models::{BypassSession, IndexerHealth};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistent store for per-indexer health rows.
#[async_trait]
pub trait HealthStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<IndexerHealth>>;

    /// Insert or fully replace one row.
    async fn upsert(&self, row: &IndexerHealth) -> Result<()>;

    async fn list_all(&self) -> Result<Vec<IndexerHealth>>;

    /// Ids with their last check time, least-recently-checked first
    /// (never-checked rows sort before everything else).
    async fn stalest(&self, limit: i64) -> Result<Vec<IndexerHealth>>;

    /// Public rows eligible for dispatch: success rate at or above the
    /// floor, not circuit-disabled at `now`, ordered by priority
    /// descending.
    async fn top_candidates(
        &self,
        min_success_rate: f64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<IndexerHealth>>;
}

/// Persistent store for solved challenge sessions, keyed by host.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, host: &str) -> Result<Option<BypassSession>>;

    async fn put(&self, session: &BypassSession) -> Result<()>;

    async fn delete(&self, host: &str) -> Result<()>;

    /// Drop every session with `expires_at` in the past. Returns how many
    /// rows went away.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// IMDB id to display-title resolution (external metadata service).
#[async_trait]
pub trait TitleResolver: Send + Sync {
    async fn resolve_title(
        &self,
        media_type: crate::models::MediaType,
        imdb_id: &str,
    ) -> Result<String>;
}
