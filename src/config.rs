//! TOML configuration.
//!
//! Only `[server]` and `[db]` are mandatory; every other section falls back
//! to the values the production site runs with. Secrets (Resend API key,
//! Teams webhook URL, LLM key) are never read from the file: the config
//! names the environment variable that holds them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Origins echoed back in CORS headers. The first entry is the default
    /// returned to origins that are not listed.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://www.it-era.it".to_string(),
        "https://it-era.it".to_string(),
        "https://it-era.pages.dev".to_string(),
        "http://localhost:8788".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5500".to_string(),
    ]
}

impl ServerConfig {
    pub fn default_origin(&self) -> &str {
        self.allowed_origins
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub persist_contacts: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct KvConfig {
    #[serde(default = "default_kv_backend")]
    pub backend: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: default_kv_backend(),
        }
    }
}

fn default_kv_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    #[serde(default = "default_email_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_email_from")]
    pub from: String,
    /// Sender used when the provider reports the primary domain as unverified.
    #[serde(default = "default_email_from_fallback")]
    pub from_fallback: String,
    #[serde(default = "default_email_from_name")]
    pub from_name: String,
    #[serde(default = "default_email_to")]
    pub to: String,
    /// Recipient accepted by the provider while the domain is unverified.
    #[serde(default = "default_email_to")]
    pub to_test: String,
    #[serde(default = "default_email_from")]
    pub reply_to: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default)]
    pub send_confirmation: bool,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api_url(),
            api_key_env: default_email_api_key_env(),
            from: default_email_from(),
            from_fallback: default_email_from_fallback(),
            from_name: default_email_from_name(),
            to: default_email_to(),
            to_test: default_email_to(),
            reply_to: default_email_from(),
            subject_prefix: default_subject_prefix(),
            send_confirmation: false,
            timeout_secs: default_email_timeout(),
        }
    }
}

fn default_email_api_url() -> String {
    "https://api.resend.com/emails".to_string()
}
fn default_email_api_key_env() -> String {
    "RESEND_API_KEY".to_string()
}
fn default_email_from() -> String {
    "info@it-era.it".to_string()
}
fn default_email_from_fallback() -> String {
    "onboarding@resend.dev".to_string()
}
fn default_email_from_name() -> String {
    "IT-ERA".to_string()
}
fn default_email_to() -> String {
    "info@it-era.it".to_string()
}
fn default_subject_prefix() -> String {
    "[IT-ERA]".to_string()
}
fn default_email_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_contact_limit")]
    pub contact: LimitConfig,
    #[serde(default = "default_chat_limit")]
    pub chat: LimitConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            contact: default_contact_limit(),
            chat: default_chat_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitConfig {
    pub max_requests: u64,
    pub window_secs: u64,
}

// The email provider's free tier allows 100 messages a day.
fn default_contact_limit() -> LimitConfig {
    LimitConfig {
        max_requests: 95,
        window_secs: 86_400,
    }
}

fn default_chat_limit() -> LimitConfig {
    LimitConfig {
        max_requests: 60,
        window_secs: 3_600,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages_per_session: usize,
    /// Lead score at which a conversation is handed to a human even
    /// without an explicit escalation keyword.
    #[serde(default = "default_escalation_score")]
    pub escalation_score: u8,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            max_messages_per_session: default_max_messages(),
            escalation_score: default_escalation_score(),
        }
    }
}

fn default_session_ttl() -> u64 {
    3_600
}
fn default_max_messages() -> usize {
    25
}
fn default_escalation_score() -> u8 {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    #[serde(default = "default_teams_env")]
    pub teams_webhook_env: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            teams_webhook_env: default_teams_env(),
        }
    }
}

fn default_teams_env() -> String {
    "TEAMS_WEBHOOK_URL".to_string()
}

impl NotificationsConfig {
    pub fn teams_webhook_url(&self) -> Option<String> {
        std::env::var(&self.teams_webhook_env)
            .ok()
            .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_ai_retries")]
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            model: None,
            base_url: default_ai_base_url(),
            api_key_env: default_ai_key_env(),
            max_tokens: default_ai_max_tokens(),
            temperature: default_ai_temperature(),
            timeout_secs: default_ai_timeout(),
            max_retries: default_ai_retries(),
        }
    }
}

fn default_ai_provider() -> String {
    "disabled".to_string()
}
fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_ai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_ai_max_tokens() -> u32 {
    150
}
fn default_ai_temperature() -> f32 {
    0.7
}
fn default_ai_timeout() -> u64 {
    8
}
fn default_ai_retries() -> u32 {
    2
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

const MAX_TTL_SECS: u64 = crate::kv::MAX_TTL.as_secs();

/// Checks cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if config.server.allowed_origins.is_empty() {
        anyhow::bail!("server.allowed_origins must list at least one origin");
    }

    for (name, limit) in [
        ("contact", &config.rate_limit.contact),
        ("chat", &config.rate_limit.chat),
    ] {
        if limit.max_requests == 0 || limit.window_secs == 0 {
            anyhow::bail!(
                "rate_limit.{}.max_requests and window_secs must be > 0",
                name
            );
        }
        if limit.window_secs > MAX_TTL_SECS {
            anyhow::bail!(
                "rate_limit.{}.window_secs must be at most {}",
                name,
                MAX_TTL_SECS
            );
        }
    }

    if config.chat.session_ttl_secs == 0 || config.chat.session_ttl_secs > MAX_TTL_SECS {
        anyhow::bail!("chat.session_ttl_secs must be between 1 and {}", MAX_TTL_SECS);
    }
    if config.analytics.retention_days > MAX_TTL_SECS / 86_400 {
        anyhow::bail!(
            "analytics.retention_days must be at most {}",
            MAX_TTL_SECS / 86_400
        );
    }

    if config.chat.max_messages_per_session == 0 {
        anyhow::bail!("chat.max_messages_per_session must be > 0");
    }

    for (field, addr) in [
        ("email.from", &config.email.from),
        ("email.from_fallback", &config.email.from_fallback),
        ("email.to", &config.email.to),
        ("email.to_test", &config.email.to_test),
    ] {
        if !addr.contains('@') {
            anyhow::bail!("{} must be an email address, got '{}'", field, addr);
        }
    }

    match config.kv.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown kv backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    match config.ai.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.ai.model.is_none() {
                anyhow::bail!("ai.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown ai provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
