use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

use super::{bounded_ttl, KvStore};

/// Store backed by the `kv` table. Expiry is kept as Unix milliseconds.
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Duration) -> i64 {
    now_ms().saturating_add(bounded_ttl(ttl).as_millis() as i64)
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(expiry))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = now_ms();
        // A single upsert keeps concurrent increments from losing updates.
        // SET expressions all see the pre-update row.
        let value: String = sqlx::query_scalar(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?1, '1', ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= ?3 THEN '1'
                    ELSE CAST(CAST(kv.value AS INTEGER) + 1 AS TEXT)
                END,
                expires_at = CASE
                    WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= ?3 THEN excluded.expires_at
                    ELSE kv.expires_at
                END
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(now.saturating_add(bounded_ttl(ttl).as_millis() as i64))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        value
            .parse::<u64>()
            .with_context(|| format!("kv counter '{}' holds a non-integer value", key))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
