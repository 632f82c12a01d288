//! PostgreSQL API key repository
//!
//! Every query is parameterized; a raw key that matches nothing is an
//! ordinary empty result, indistinguishable from any other miss. All calls
//! carry a deadline so a stalled database cannot wedge the admission
//! pipeline.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::domain::api_key::{ApiKey, ApiKeyPage, ApiKeyRepository, ListApiKeysParams};
use crate::domain::DomainError;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Pool acquire timeout in seconds
    pub acquire_timeout_secs: u64,
    /// Per-statement deadline in seconds
    pub statement_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/dh_api".to_string(),
            max_connections: 10,
            min_connections: 5,
            acquire_timeout_secs: 5,
            statement_timeout_secs: 5,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Create a bounded connection pool from the configuration
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
}

const SELECT_COLUMNS: &str = "id, key, name, description, user_id, permissions, is_active, \
     expires_at, last_used_at, created_at, updated_at, usage_count, rate_limit, rate_limit_used";

/// PostgreSQL implementation of [`ApiKeyRepository`]
#[derive(Debug)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresApiKeyRepository {
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

    /// Ensure the `api_keys` table exists
    pub async fn migrate(&self) -> Result<(), DomainError> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                id VARCHAR(64) PRIMARY KEY,
                key VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description VARCHAR(500),
                user_id VARCHAR(64),
                permissions TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                expires_at TIMESTAMPTZ,
                last_used_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                usage_count BIGINT NOT NULL DEFAULT 0,
                rate_limit INTEGER,
                rate_limit_used INTEGER NOT NULL DEFAULT 0
            )
        "#;

        self.deadline(sqlx::query(query).execute(&self.pool)).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a sqlx future under the per-statement deadline
    async fn deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, DomainError> {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_sqlx_error(e)),
            Err(_) => Err(DomainError::storage("database statement timed out")),
        }
    }
}

fn map_sqlx_error(e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return DomainError::conflict("API key already exists");
        }
    }
    DomainError::storage(format!("database error: {}", e))
}

fn row_to_api_key(row: &PgRow) -> Result<ApiKey, DomainError> {
    let permissions_json: String = row
        .try_get("permissions")
        .map_err(|e| DomainError::storage(format!("failed to read row: {}", e)))?;
    let permissions: Vec<String> = serde_json::from_str(&permissions_json)
        .map_err(|e| DomainError::storage(format!("failed to decode permissions: {}", e)))?;

    let get = |col: &str| -> DomainError {
        DomainError::storage(format!("failed to read column '{}'", col))
    };

    Ok(ApiKey::from_storage(
        row.try_get("id").map_err(|_| get("id"))?,
        row.try_get("key").map_err(|_| get("key"))?,
        row.try_get("name").map_err(|_| get("name"))?,
        row.try_get("description").map_err(|_| get("description"))?,
        row.try_get("user_id").map_err(|_| get("user_id"))?,
        permissions,
        row.try_get("is_active").map_err(|_| get("is_active"))?,
        row.try_get("expires_at").map_err(|_| get("expires_at"))?,
        row.try_get("last_used_at").map_err(|_| get("last_used_at"))?,
        row.try_get("created_at").map_err(|_| get("created_at"))?,
        row.try_get("updated_at").map_err(|_| get("updated_at"))?,
        row.try_get("usage_count").map_err(|_| get("usage_count"))?,
        row.try_get("rate_limit").map_err(|_| get("rate_limit"))?,
        row.try_get("rate_limit_used")
            .map_err(|_| get("rate_limit_used"))?,
    ))
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, DomainError> {
        let query = format!("SELECT {} FROM api_keys WHERE id = $1", SELECT_COLUMNS);

        let row = self
            .deadline(sqlx::query(&query).bind(id).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<ApiKey>, DomainError> {
        let query = format!("SELECT {} FROM api_keys WHERE key = $1", SELECT_COLUMNS);

        let row = self
            .deadline(sqlx::query(&query).bind(key).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let permissions_json = serde_json::to_string(api_key.permissions())
            .map_err(|e| DomainError::storage(format!("failed to encode permissions: {}", e)))?;

        let query = r#"
            INSERT INTO api_keys (
                id, key, name, description, user_id, permissions, is_active,
                expires_at, last_used_at, created_at, updated_at,
                usage_count, rate_limit, rate_limit_used
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#;

        self.deadline(
            sqlx::query(query)
                .bind(api_key.id())
                .bind(api_key.key())
                .bind(api_key.name())
                .bind(api_key.description())
                .bind(api_key.user_id())
                .bind(&permissions_json)
                .bind(api_key.is_active())
                .bind(api_key.expires_at())
                .bind(api_key.last_used_at())
                .bind(api_key.created_at())
                .bind(api_key.updated_at())
                .bind(api_key.usage_count())
                .bind(api_key.rate_limit())
                .bind(api_key.rate_limit_used())
                .execute(&self.pool),
        )
        .await?;

        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let permissions_json = serde_json::to_string(api_key.permissions())
            .map_err(|e| DomainError::storage(format!("failed to encode permissions: {}", e)))?;

        let query = r#"
            UPDATE api_keys
            SET name = $2, description = $3, permissions = $4, is_active = $5,
                expires_at = $6, rate_limit = $7, rate_limit_used = $8,
                updated_at = $9
            WHERE id = $1
        "#;

        let result = self
            .deadline(
                sqlx::query(query)
                    .bind(api_key.id())
                    .bind(api_key.name())
                    .bind(api_key.description())
                    .bind(&permissions_json)
                    .bind(api_key.is_active())
                    .bind(api_key.expires_at())
                    .bind(api_key.rate_limit())
                    .bind(api_key.rate_limit_used())
                    .bind(api_key.updated_at())
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                api_key.id()
            )));
        }

        Ok(api_key.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        let result = self
            .deadline(
                sqlx::query("DELETE FROM api_keys WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, params: &ListApiKeysParams) -> Result<ApiKeyPage, DomainError> {
        let (page, limit) = params.normalized();
        let search = params
            .search
            .as_ref()
            .map(|s| format!("%{}%", s));

        let query = format!(
            r#"
            SELECT {}
            FROM api_keys
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR user_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            SELECT_COLUMNS
        );

        let rows = self
            .deadline(
                sqlx::query(&query)
                    .bind(&search)
                    .bind(params.is_active)
                    .bind(&params.user_id)
                    .bind(limit)
                    .bind((page - 1) * limit)
                    .fetch_all(&self.pool),
            )
            .await?;

        let mut api_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            api_keys.push(row_to_api_key(row)?);
        }

        let count_query = r#"
            SELECT COUNT(*) AS total
            FROM api_keys
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR user_id = $3)
        "#;

        let count_row = self
            .deadline(
                sqlx::query(count_query)
                    .bind(&search)
                    .bind(params.is_active)
                    .bind(&params.user_id)
                    .fetch_one(&self.pool),
            )
            .await?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| DomainError::storage(format!("failed to read count: {}", e)))?;

        Ok(ApiKeyPage { api_keys, total })
    }

    async fn has_any(&self) -> Result<bool, DomainError> {
        let row = self
            .deadline(
                sqlx::query("SELECT EXISTS(SELECT 1 FROM api_keys) AS present")
                    .fetch_one(&self.pool),
            )
            .await?;

        row.try_get("present")
            .map_err(|e| DomainError::storage(format!("failed to read existence: {}", e)))
    }

    async fn record_usage(&self, id: &str) -> Result<(), DomainError> {
        // One statement so the counters move together
        let query = r#"
            UPDATE api_keys
            SET usage_count = usage_count + 1,
                last_used_at = NOW(),
                rate_limit_used = rate_limit_used
                    + CASE WHEN rate_limit IS NOT NULL THEN 1 ELSE 0 END
            WHERE id = $1
        "#;

        let result = self
            .deadline(sqlx::query(query).bind(id).execute(&self.pool))
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                id
            )));
        }

        Ok(())
    }

    async fn close(&self) {
        // PgPool::close is idempotent
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_defaults() {
        let config = PostgresConfig::default();

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout_secs, 5);
        assert_eq!(config.statement_timeout_secs, 5);
    }

    #[test]
    fn test_postgres_config_new_keeps_bounds() {
        let config = PostgresConfig::new("postgres://localhost/test");

        assert_eq!(config.url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 10);
    }
}
