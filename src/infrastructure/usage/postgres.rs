//! PostgreSQL usage repository
//!
//! Append-only rows in `api_key_usage`, cascade-deleted with their key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::usage::{EndpointStat, UsageRecord, UsageRepository, UsageStats};
use crate::domain::DomainError;

/// PostgreSQL implementation of [`UsageRepository`]
#[derive(Debug)]
pub struct PostgresUsageRepository {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Ensure the `api_key_usage` table exists. Must run after the
    /// `api_keys` migration because of the foreign key.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS api_key_usage (
                id BIGSERIAL PRIMARY KEY,
                api_key_id VARCHAR(64) NOT NULL
                    REFERENCES api_keys(id) ON DELETE CASCADE,
                endpoint VARCHAR(255) NOT NULL,
                method VARCHAR(16) NOT NULL,
                status INTEGER NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                ip_address VARCHAR(64) NOT NULL DEFAULT '',
                user_agent VARCHAR(512) NOT NULL DEFAULT ''
            )
        "#;

        self.deadline(sqlx::query(query).execute(&self.pool)).await?;

        self.deadline(
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_api_key_usage_key_ts \
                 ON api_key_usage (api_key_id, timestamp)",
            )
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, DomainError> {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DomainError::storage(format!("database error: {}", e))),
            Err(_) => Err(DomainError::storage("database statement timed out")),
        }
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn record(&self, record: UsageRecord) -> Result<(), DomainError> {
        let query = r#"
            INSERT INTO api_key_usage
                (api_key_id, endpoint, method, status, timestamp, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;

        self.deadline(
            sqlx::query(query)
                .bind(&record.api_key_id)
                .bind(&record.endpoint)
                .bind(&record.method)
                .bind(record.status)
                .bind(record.timestamp)
                .bind(&record.ip_address)
                .bind(&record.user_agent)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn stats_for_key(&self, api_key_id: &str) -> Result<UsageStats, DomainError> {
        let totals_query = r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE timestamp >= NOW() - INTERVAL '1 day') AS today,
                COUNT(*) FILTER (WHERE timestamp >= NOW() - INTERVAL '7 days') AS week,
                COUNT(*) FILTER (WHERE timestamp >= NOW() - INTERVAL '30 days') AS month,
                MAX(timestamp) AS last_used
            FROM api_key_usage
            WHERE api_key_id = $1
        "#;

        let row = self
            .deadline(
                sqlx::query(totals_query)
                    .bind(api_key_id)
                    .fetch_one(&self.pool),
            )
            .await?;

        let read_count = |col: &str, row: &sqlx::postgres::PgRow| -> Result<i64, DomainError> {
            row.try_get(col)
                .map_err(|e| DomainError::storage(format!("failed to read '{}': {}", col, e)))
        };

        let mut stats = UsageStats {
            total_requests: read_count("total", &row)?,
            requests_today: read_count("today", &row)?,
            requests_this_week: read_count("week", &row)?,
            requests_this_month: read_count("month", &row)?,
            last_used: row
                .try_get::<Option<DateTime<Utc>>, _>("last_used")
                .map_err(|e| DomainError::storage(format!("failed to read last_used: {}", e)))?,
            ..UsageStats::default()
        };

        let endpoints_query = r#"
            SELECT endpoint, COUNT(*) AS count
            FROM api_key_usage
            WHERE api_key_id = $1
            GROUP BY endpoint
            ORDER BY count DESC, endpoint
            LIMIT 10
        "#;

        let rows = self
            .deadline(
                sqlx::query(endpoints_query)
                    .bind(api_key_id)
                    .fetch_all(&self.pool),
            )
            .await?;

        for row in &rows {
            stats.top_endpoints.push(EndpointStat {
                endpoint: row
                    .try_get("endpoint")
                    .map_err(|e| DomainError::storage(format!("failed to read endpoint: {}", e)))?,
                count: read_count("count", row)?,
            });
        }

        let status_query = r#"
            SELECT status, COUNT(*) AS count
            FROM api_key_usage
            WHERE api_key_id = $1
            GROUP BY status
        "#;

        let rows = self
            .deadline(
                sqlx::query(status_query)
                    .bind(api_key_id)
                    .fetch_all(&self.pool),
            )
            .await?;

        for row in &rows {
            let status: i32 = row
                .try_get("status")
                .map_err(|e| DomainError::storage(format!("failed to read status: {}", e)))?;
            stats
                .status_codes
                .insert(status.to_string(), read_count("count", row)?);
        }

        Ok(stats)
    }
}
