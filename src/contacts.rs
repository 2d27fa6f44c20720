//! Stored contact submissions.
//!
//! Every accepted form is kept in the `contacts` table so leads survive an
//! email outage. `itera contacts` prints the most recent ones.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::ContactSubmission;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContact {
    pub id: i64,
    pub ticket_id: String,
    pub nome: String,
    pub azienda: Option<String>,
    pub email: String,
    pub telefono: String,
    pub comune: Option<String>,
    pub servizi: Vec<String>,
    pub urgenza: String,
    pub form_type: String,
    pub lead_score: i64,
    pub created_at: String,
}

#[derive(Clone)]
pub struct ContactStore {
    pool: SqlitePool,
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl ContactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a submission and returns its row id.
    pub async fn insert(
        &self,
        sub: &ContactSubmission,
        ticket_id: &str,
        lead_score: u8,
        ip: &str,
    ) -> Result<i64> {
        let servizi = serde_json::to_string(&sub.servizi)?;
        let urgenza = non_empty(&sub.urgenza).unwrap_or("normale");
        let form_type = non_empty(&sub.form_type).unwrap_or("preventivo");

        let result = sqlx::query(
            r#"
            INSERT INTO contacts (
                ticket_id, nome, azienda, email, telefono, comune, dipendenti,
                servizi, urgenza, messaggio, form_type, lead_score, ip_address, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ticket_id)
        .bind(&sub.nome)
        .bind(non_empty(&sub.azienda))
        .bind(&sub.email)
        .bind(&sub.telefono)
        .bind(non_empty(&sub.comune))
        .bind(non_empty(&sub.dipendenti))
        .bind(servizi)
        .bind(urgenza)
        .bind(non_empty(&sub.messaggio))
        .bind(form_type)
        .bind(lead_score as i64)
        .bind(ip)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Newest submissions first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<StoredContact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, ticket_id, nome, azienda, email, telefono, comune, servizi,
                   urgenza, form_type, lead_score, created_at
            FROM contacts
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let contacts = rows
            .iter()
            .map(|row| {
                let servizi: String = row.get("servizi");
                StoredContact {
                    id: row.get("id"),
                    ticket_id: row.get("ticket_id"),
                    nome: row.get("nome"),
                    azienda: row.get("azienda"),
                    email: row.get("email"),
                    telefono: row.get("telefono"),
                    comune: row.get("comune"),
                    servizi: serde_json::from_str(&servizi).unwrap_or_default(),
                    urgenza: row.get("urgenza"),
                    form_type: row.get("form_type"),
                    lead_score: row.get("lead_score"),
                    created_at: row.get("created_at"),
                }
            })
            .collect();

        Ok(contacts)
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

/// `itera contacts`: prints the latest submissions.
pub async fn run_contacts(config: &Config, limit: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ContactStore::new(pool);
    let contacts = store.recent(limit).await?;

    if contacts.is_empty() {
        println!("No contacts stored yet.");
        return Ok(());
    }

    println!(
        "{:<20} {:<25} {:<30} {:>5}  {}",
        "TICKET", "NOME", "EMAIL", "SCORE", "RICEVUTO"
    );
    for c in &contacts {
        println!(
            "{:<20} {:<25} {:<30} {:>5}  {}",
            c.ticket_id,
            truncate(&c.nome, 25),
            truncate(&c.email, 30),
            c.lead_score,
            c.created_at
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
