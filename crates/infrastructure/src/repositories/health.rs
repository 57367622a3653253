//! PostgreSQL implementation of the health store

use crate::database::DatabasePool;
use crate::error::InfrastructureError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use magnetarr_core::{HealthStore, IndexerHealth, MediaType, Result, SolverNeed};
use sqlx::Row;
use std::collections::BTreeSet;

const ROW_COLUMNS: &str = "id, display_name, language, is_public, content_types, \
     last_checked_at, last_succeeded_at, total_checks, total_successes, total_failures, \
     success_rate, avg_response_ms, consecutive_failures, enabled, disabled_until, \
     working_domain, last_error, requires_solver, priority";

/// PostgreSQL-backed health store
pub struct PostgresHealthStore {
    pool: DatabasePool,
}

impl PostgresHealthStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn row_to_health(row: &sqlx::postgres::PgRow) -> Result<IndexerHealth> {
        let content_types: serde_json::Value = row
            .try_get("content_types")
            .map_err(InfrastructureError::Database)?;
        let content_types: BTreeSet<MediaType> = content_types
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(MediaType::parse)
                    .collect()
            })
            .unwrap_or_default();
        let requires_solver: String = row
            .try_get("requires_solver")
            .map_err(InfrastructureError::Database)?;

        Ok(IndexerHealth {
            id: get(row, "id")?,
            display_name: get(row, "display_name")?,
            language: get(row, "language")?,
            is_public: get(row, "is_public")?,
            content_types,
            last_checked_at: get(row, "last_checked_at")?,
            last_succeeded_at: get(row, "last_succeeded_at")?,
            total_checks: get(row, "total_checks")?,
            total_successes: get(row, "total_successes")?,
            total_failures: get(row, "total_failures")?,
            success_rate: get(row, "success_rate")?,
            avg_response_ms: get(row, "avg_response_ms")?,
            consecutive_failures: get(row, "consecutive_failures")?,
            enabled: get(row, "enabled")?,
            disabled_until: get(row, "disabled_until")?,
            working_domain: get(row, "working_domain")?,
            last_error: get(row, "last_error")?,
            requires_solver: SolverNeed::parse(&requires_solver),
            priority: get(row, "priority")?,
        })
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| InfrastructureError::Database(e).into())
}

#[async_trait]
impl HealthStore for PostgresHealthStore {
    async fn get(&self, id: &str) -> Result<Option<IndexerHealth>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM indexer_health WHERE id = $1",
            ROW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;

        row.as_ref().map(Self::row_to_health).transpose()
    }

    async fn upsert(&self, health: &IndexerHealth) -> Result<()> {
        let content_types = serde_json::to_value(
            health
                .content_types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>(),
        )
        .map_err(InfrastructureError::Serialization)?;

        sqlx::query(
            "INSERT INTO indexer_health (id, display_name, language, is_public, content_types, \
             last_checked_at, last_succeeded_at, total_checks, total_successes, total_failures, \
             success_rate, avg_response_ms, consecutive_failures, enabled, disabled_until, \
             working_domain, last_error, requires_solver, priority) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
             ON CONFLICT (id) DO UPDATE SET \
             display_name = EXCLUDED.display_name, \
             language = EXCLUDED.language, \
             is_public = EXCLUDED.is_public, \
             content_types = EXCLUDED.content_types, \
             last_checked_at = EXCLUDED.last_checked_at, \
             last_succeeded_at = EXCLUDED.last_succeeded_at, \
             total_checks = EXCLUDED.total_checks, \
             total_successes = EXCLUDED.total_successes, \
             total_failures = EXCLUDED.total_failures, \
             success_rate = EXCLUDED.success_rate, \
             avg_response_ms = EXCLUDED.avg_response_ms, \
             consecutive_failures = EXCLUDED.consecutive_failures, \
             enabled = EXCLUDED.enabled, \
             disabled_until = EXCLUDED.disabled_until, \
             working_domain = EXCLUDED.working_domain, \
             last_error = EXCLUDED.last_error, \
             requires_solver = EXCLUDED.requires_solver, \
             priority = EXCLUDED.priority",
        )
        .bind(&health.id)
        .bind(&health.display_name)
        .bind(&health.language)
        .bind(health.is_public)
        .bind(content_types)
        .bind(health.last_checked_at)
        .bind(health.last_succeeded_at)
        .bind(health.total_checks)
        .bind(health.total_successes)
        .bind(health.total_failures)
        .bind(health.success_rate)
        .bind(health.avg_response_ms)
        .bind(health.consecutive_failures)
        .bind(health.enabled)
        .bind(health.disabled_until)
        .bind(&health.working_domain)
        .bind(&health.last_error)
        .bind(health.requires_solver.as_str())
        .bind(health.priority)
        .execute(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<IndexerHealth>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM indexer_health ORDER BY id",
            ROW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;

        rows.iter().map(Self::row_to_health).collect()
    }

    async fn stalest(&self, limit: i64) -> Result<Vec<IndexerHealth>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM indexer_health \
             ORDER BY last_checked_at ASC NULLS FIRST LIMIT $1",
            ROW_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;

        rows.iter().map(Self::row_to_health).collect()
    }

    async fn top_candidates(
        &self,
        min_success_rate: f64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<IndexerHealth>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM indexer_health \
             WHERE is_public = TRUE \
               AND success_rate >= $1 \
               AND (disabled_until IS NULL OR disabled_until <= $2) \
             ORDER BY priority DESC LIMIT $3",
            ROW_COLUMNS
        ))
        .bind(min_success_rate)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;

        rows.iter().map(Self::row_to_health).collect()
    }
}
