//! Outbound email through the Resend HTTP API.
//!
//! [`Mailer`] is the seam the contact pipeline talks to; tests swap in a
//! recording implementation instead of reaching the network.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::EmailConfig;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmailTag {
    pub name: String,
    pub value: String,
}

impl EmailTag {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A message in the shape the Resend API accepts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<EmailTag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email provider rejected the message ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        body: String,
    },
    #[error("email transport error: {0}")]
    Transport(String),
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
}

impl MailError {
    /// True when the provider refused the sender because its domain is not
    /// verified yet. Only these rejections are retried from the fallback
    /// sender.
    pub fn is_unverified_domain(&self) -> bool {
        match self {
            MailError::Rejected { status, body, .. } => {
                *status == 403
                    && (body.contains("verify a domain") || body.contains("testing emails"))
            }
            _ => false,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, MailError>;
}

/// Formats a `Name <address>` sender.
pub fn mailbox(name: &str, address: &str) -> String {
    if name.is_empty() {
        address.to_string()
    } else {
        format!("{} <{}>", name, address)
    }
}

/// Pulls a human-readable message out of an error body: the JSON
/// `message` or `error` field when present, otherwise the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

pub struct ResendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key_env: String,
}

impl ResendMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, MailError> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| MailError::MissingApiKey(self.api_key_env.clone()))?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
                body,
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| MailError::Transport(e.to_string()))?;
        let id = json
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        tracing::debug!(email_id = %id, "email accepted by provider");
        Ok(SentEmail { id })
    }
}
