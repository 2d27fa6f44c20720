//! Lead and storage overview for `itera stats`.
//!
//! Reads the `contacts` table and the daily `leads:<date>` counters the
//! contact pipeline maintains, so an operator can check that submissions
//! are arriving without opening the mailbox.

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::config::Config;
use crate::contact::analytics_key;
use crate::contacts::ContactStore;
use crate::db;
use crate::kv::{self, KvStore};

/// Longest look-back the stats command accepts.
pub const MAX_DAYS: u32 = 3_650;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, days: u32) -> Result<()> {
    let days = days.min(MAX_DAYS);
    let pool = db::connect(config).await?;

    let total_contacts = ContactStore::new(pool.clone()).count().await?;

    let since = (Utc::now() - Duration::days(days as i64)).to_rfc3339();
    let recent_contacts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE created_at >= ?")
            .bind(&since)
            .fetch_one(&pool)
            .await?;

    let avg_score: Option<f64> =
        sqlx::query_scalar("SELECT AVG(lead_score) FROM contacts WHERE created_at >= ?")
            .bind(&since)
            .fetch_one(&pool)
            .await?;

    let live_sessions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM kv WHERE key LIKE 'chat:session:%' AND (expires_at IS NULL OR expires_at > ?)",
    )
    .bind(Utc::now().timestamp_millis())
    .fetch_one(&pool)
    .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("IT-ERA Lead Stats");
    println!("===================");
    println!();
    println!("  Database:        {}", config.db.path.display());
    println!("  Size:            {}", format_bytes(db_size));
    println!();
    println!("  Contacts:        {}", total_contacts);
    println!("  Last {:>3} days:   {}", days, recent_contacts);
    println!(
        "  Avg lead score:  {}",
        avg_score
            .map(|s| format!("{:.0}/100", s))
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Chat sessions:   {} live", live_sessions);

    let store = kv::open(config, &pool)?;
    let daily = daily_leads(store.as_ref(), days).await?;
    if config.kv.backend == "memory" {
        println!();
        println!("  Daily counters are kept in memory by the running server and are not shown.");
    } else if !daily.is_empty() {
        println!();
        println!("  {:<12} {:>6}", "DAY", "LEADS");
        println!("  {}", "-".repeat(19));
        for (day, count) in &daily {
            println!("  {:<12} {:>6}", day, count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// `(YYYY-MM-DD, count)` for each of the last `days` days, newest first.
pub async fn daily_leads(store: &dyn KvStore, days: u32) -> Result<Vec<(String, u64)>> {
    let days = days.min(MAX_DAYS);
    let now = Utc::now();
    let mut out = Vec::with_capacity(days as usize);
    for offset in 0..days {
        let day = now - Duration::days(offset as i64);
        let count = store
            .get(&analytics_key(day))
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        out.push((day.format("%Y-%m-%d").to_string(), count));
    }
    Ok(out)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn daily_leads_reads_counters() {
        let store = MemoryKv::new();
        let ttl = std::time::Duration::from_secs(60);
        store.increment(&analytics_key(Utc::now()), ttl).await.unwrap();
        store.increment(&analytics_key(Utc::now()), ttl).await.unwrap();

        let daily = daily_leads(&store, 3).await.unwrap();
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].1, 2);
        assert_eq!(daily[1].1, 0);
    }

    #[test]
    fn bytes_are_humanised() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
