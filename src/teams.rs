//! Microsoft Teams lead alerts.
//!
//! Alerts are posted as legacy Office 365 connector `MessageCard`s to an
//! incoming webhook. Delivery is best effort: a failure is logged and
//! reported as `false`, never propagated.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::NotificationsConfig;
use crate::lead;
use crate::triage::Priority;

/// What the sales team needs to call a lead back.
#[derive(Debug, Clone)]
pub struct LeadAlert {
    pub session_id: String,
    pub nome: String,
    pub azienda: String,
    pub email: String,
    pub telefono: String,
    pub zona: String,
    pub servizio: String,
    pub priority: Priority,
    pub lead_score: u8,
    pub messages: usize,
    /// Latest visitor message or free-form notes.
    pub dettagli: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the alert was accepted downstream.
    async fn notify(&self, alert: &LeadAlert) -> bool;
}

fn or_unknown(s: &str) -> &str {
    if s.trim().is_empty() {
        "Non specificato"
    } else {
        s
    }
}

pub fn theme_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Immediate => "FF0000",
        Priority::High => "FF6600",
        Priority::Medium => "0078D4",
        Priority::Low => "00BCF2",
    }
}

pub fn build_card(alert: &LeadAlert) -> Value {
    let quality = lead::quality(alert.lead_score);
    let priorita = match alert.priority {
        Priority::Immediate => "🚨 IMMEDIATA",
        Priority::High => "🔴 ALTA",
        Priority::Medium => "🟡 MEDIA",
        Priority::Low => "🟢 BASSA",
    };

    let mut actions = Vec::new();
    if !alert.telefono.trim().is_empty() {
        actions.push(json!({
            "@type": "OpenUri",
            "name": "📞 Chiama Subito",
            "targets": [{ "os": "default", "uri": format!("tel:{}", alert.telefono) }]
        }));
    }
    if !alert.email.trim().is_empty() {
        actions.push(json!({
            "@type": "OpenUri",
            "name": "📧 Invia Email",
            "targets": [{ "os": "default", "uri": format!("mailto:{}", alert.email) }]
        }));
    }

    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "summary": format!("Nuovo lead dal chatbot: {}", or_unknown(&alert.azienda)),
        "themeColor": theme_color(alert.priority),
        "sections": [{
            "activityTitle": format!(
                "{} LEAD QUALITÀ {} ({}/100) - {}",
                quality.emoji, quality.label, alert.lead_score, or_unknown(&alert.servizio)
            ),
            "activitySubtitle": format!("{} • {}", or_unknown(&alert.azienda), or_unknown(&alert.zona)),
            "facts": [
                { "name": "👤 Cliente:", "value": or_unknown(&alert.nome) },
                { "name": "📱 Telefono:", "value": or_unknown(&alert.telefono) },
                { "name": "📧 Email:", "value": or_unknown(&alert.email) },
                { "name": "🏢 Azienda:", "value": or_unknown(&alert.azienda) },
                { "name": "📍 Zona:", "value": or_unknown(&alert.zona) },
                { "name": "🎯 Servizio:", "value": or_unknown(&alert.servizio) },
                { "name": "🚨 Priorità:", "value": priorita },
                { "name": format!("{} Lead Score:", quality.emoji),
                  "value": format!("**{}/100** - Qualità {}", alert.lead_score, quality.label) },
                { "name": "💬 Messaggi:", "value": format!("{} nel chatbot", alert.messages) },
                { "name": "🔗 Sessione:", "value": alert.session_id },
            ],
            "text": format!("**Dettagli:**\n{}", or_unknown(&alert.dettagli)),
        }],
        "potentialAction": actions,
    })
}

pub struct TeamsNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl TeamsNotifier {
    pub fn new(webhook_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub fn from_config(config: &NotificationsConfig) -> anyhow::Result<Self> {
        Self::new(config.teams_webhook_url())
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    async fn notify(&self, alert: &LeadAlert) -> bool {
        let Some(url) = &self.webhook_url else {
            tracing::debug!(session = %alert.session_id, "teams webhook not configured, skipping alert");
            return false;
        };

        let card = build_card(alert);
        match self.client.post(url).json(&card).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(
                    session = %alert.session_id,
                    score = alert.lead_score,
                    "lead alert sent to teams"
                );
                true
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "teams webhook rejected lead alert");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "teams webhook request failed");
                false
            }
        }
    }
}
