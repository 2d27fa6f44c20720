//! Key-value storage with per-entry expiry.
//!
//! Rate-limit counters, chat sessions and daily analytics counters all
//! live here. Two backends implement [`KvStore`]:
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │               KvStore                 │
//! │  ┌──────────────┐  ┌───────────────┐  │
//! │  │  MemoryKv    │  │   SqliteKv    │  │
//! │  │ (tests, dev) │  │ (`kv` table)  │  │
//! │  └──────────────┘  └───────────────┘  │
//! └──────────────────┬────────────────────┘
//!                    ▼
//!     ratelimit · chat sessions · analytics
//! ```
//!
//! Expired entries behave exactly like missing ones. They are dropped by
//! [`KvStore::purge_expired`], which `serve` runs every hour. TTLs are
//! capped at [`MAX_TTL`].

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Longest expiry any entry can get. Longer TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 86_400);

pub(crate) fn bounded_ttl(ttl: Duration) -> Duration {
    ttl.min(MAX_TTL)
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if it is missing or
    /// expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value`, replacing any previous entry. `ttl` of `None` keeps
    /// the entry until it is deleted.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically adds one to the integer stored under `key` and returns
    /// the new value.
    ///
    /// A missing or expired key starts at 1 and receives `ttl`. An existing
    /// live key keeps its first expiry, which gives fixed windows.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Removes every expired entry and returns how many were dropped.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Builds the backend selected by `[kv] backend`.
pub fn open(config: &Config, pool: &SqlitePool) -> Result<Arc<dyn KvStore>> {
    match config.kv.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryKv::new())),
        "sqlite" => Ok(Arc::new(SqliteKv::new(pool.clone()))),
        other => anyhow::bail!("Unknown kv backend: '{}'", other),
    }
}

pub async fn get_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match kv.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize + Sync>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    kv.put(key, &raw, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        n: u32,
    }

    #[tokio::test]
    async fn json_helpers_round_trip_through_memory() {
        let kv = MemoryKv::new();
        put_json(&kv, "probe", &Probe { n: 7 }, None).await.unwrap();
        let back: Option<Probe> = get_json(&kv, "probe").await.unwrap();
        assert_eq!(back, Some(Probe { n: 7 }));

        let missing: Option<Probe> = get_json(&kv, "nope").await.unwrap();
        assert!(missing.is_none());
    }
}
