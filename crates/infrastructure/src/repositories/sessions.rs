//! PostgreSQL implementation of the session store

use crate::database::DatabasePool;
use crate::error::InfrastructureError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use magnetarr_core::{BypassSession, Result, SessionCookie, SessionStore};
use sqlx::Row;

/// PostgreSQL-backed store for solved challenge sessions
pub struct PostgresSessionStore {
    pool: DatabasePool,
}

impl PostgresSessionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn get(&self, host: &str) -> Result<Option<BypassSession>> {
        let row = sqlx::query(
            "SELECT host, cookies, user_agent, expires_at FROM cf_sessions WHERE host = $1",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;

        match row {
            Some(row) => {
                let cookies: serde_json::Value = row
                    .try_get("cookies")
                    .map_err(InfrastructureError::Database)?;
                let cookies: Vec<SessionCookie> = serde_json::from_value(cookies)
                    .map_err(InfrastructureError::Serialization)?;
                Ok(Some(BypassSession {
                    host: row.try_get("host").map_err(InfrastructureError::Database)?,
                    cookies,
                    user_agent: row
                        .try_get("user_agent")
                        .map_err(InfrastructureError::Database)?,
                    expires_at: row
                        .try_get("expires_at")
                        .map_err(InfrastructureError::Database)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, session: &BypassSession) -> Result<()> {
        let cookies = serde_json::to_value(&session.cookies)
            .map_err(InfrastructureError::Serialization)?;
        sqlx::query(
            "INSERT INTO cf_sessions (host, cookies, user_agent, expires_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (host) DO UPDATE SET \
             cookies = EXCLUDED.cookies, \
             user_agent = EXCLUDED.user_agent, \
             expires_at = EXCLUDED.expires_at",
        )
        .bind(&session.host)
        .bind(cookies)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(InfrastructureError::Database)?;
        Ok(())
    }

    async fn delete(&self, host: &str) -> Result<()> {
        sqlx::query("DELETE FROM cf_sessions WHERE host = $1")
            .bind(host)
            .execute(&self.pool)
            .await
            .map_err(InfrastructureError::Database)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cf_sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(InfrastructureError::Database)?;
        Ok(result.rows_affected())
    }
}
