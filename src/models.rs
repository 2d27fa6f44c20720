//! Core data types shared by the contact and chat pipelines.
//!
//! Wire types use the Italian field names the site's forms post and
//! camelCase for the rest, so the widget and form scripts need no mapping.

use serde::{Deserialize, Serialize};

/// Contact form body as posted by the site. Everything is optional on the
/// wire; [`crate::validate::validate_contact`] decides what is acceptable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub azienda: Option<String>,
    #[serde(default)]
    pub comune: Option<String>,
    #[serde(default)]
    pub dipendenti: Option<String>,
    #[serde(default)]
    pub servizi: Option<Vec<String>>,
    #[serde(default)]
    pub urgenza: Option<String>,
    #[serde(default)]
    pub messaggio: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub privacy: bool,
}

/// A validated, sanitised contact submission.
#[derive(Debug, Clone, Serialize)]
pub struct ContactSubmission {
    pub nome: String,
    pub email: String,
    pub telefono: String,
    pub azienda: String,
    pub comune: String,
    pub dipendenti: String,
    pub servizi: Vec<String>,
    pub urgenza: String,
    pub messaggio: String,
    pub form_type: String,
}

impl ContactSubmission {
    pub fn is_urgent(&self) -> bool {
        self.urgenza.eq_ignore_ascii_case("urgente")
    }
}

/// Request metadata captured by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: Option<String>,
}

/// Chat widget request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub action: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

/// A conversation as persisted in the KV store.
///
/// `messages` is append-only; the session disappears when its TTL lapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    /// Unix milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_step")]
    pub step: String,
    #[serde(default)]
    pub lead_score: u8,
    /// Whether a human has already been notified about this conversation.
    #[serde(default)]
    pub notified: bool,
}

fn default_step() -> String {
    "greeting".to_string()
}

impl ChatSession {
    pub fn new(id: String, now_ms: i64) -> Self {
        Self {
            id,
            created_at: now_ms,
            messages: Vec::new(),
            step: default_step(),
            lead_score: 0,
            notified: false,
        }
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// All user-authored text, oldest first, joined by spaces.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
