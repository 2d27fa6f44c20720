use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Opens the configured database and applies the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Contact form submissions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id TEXT NOT NULL,
            nome TEXT NOT NULL,
            azienda TEXT,
            email TEXT NOT NULL,
            telefono TEXT NOT NULL,
            comune TEXT,
            dipendenti TEXT,
            servizi TEXT NOT NULL DEFAULT '[]',
            urgenza TEXT NOT NULL DEFAULT 'normale',
            messaggio TEXT,
            form_type TEXT NOT NULL DEFAULT 'preventivo',
            lead_score INTEGER NOT NULL DEFAULT 0,
            ip_address TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Key-value entries with optional expiry (rate limits, sessions, counters)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_created_at ON contacts(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_ticket_id ON contacts(ticket_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_expires_at ON kv(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
