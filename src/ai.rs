//! Optional language-model replies for the chat widget.
//!
//! Talks to any OpenAI-compatible `POST /chat/completions` endpoint.
//! Disabled by default; the chat engine then answers from canned replies.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//!
//! Backoff doubles from one second and is capped at 32 seconds.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::AiConfig;
use crate::models::{ChatMessage, Role};

/// How many earlier session messages are sent as context.
pub const HISTORY_WINDOW: usize = 6;

#[async_trait]
pub trait Assistant: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produces a reply to `message`. `history` excludes `message` itself.
    async fn reply(&self, system_prompt: &str, history: &[ChatMessage], message: &str)
        -> Result<String>;
}

/// Builds the configured assistant, or `None` when `[ai] provider` is
/// `disabled`.
pub fn create_assistant(config: &AiConfig) -> Result<Option<Box<dyn Assistant>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Box::new(OpenAiAssistant::new(config)?))),
        other => bail!("Unknown ai provider: {}", other),
    }
}

pub struct OpenAiAssistant {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiAssistant {
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the API key variable is
    /// missing from the environment.
    pub fn new(config: &AiConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ai.model required for openai provider"))?;

        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

/// Assembles the `messages` array: system prompt, the tail of the
/// conversation, then the new user message.
pub fn build_messages(system_prompt: &str, history: &[ChatMessage], message: &str) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "system", "content": system_prompt })];

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    for m in &history[start..] {
        let role = match m.role {
            Role::User => "user",
            Role::Bot => "assistant",
        };
        messages.push(json!({ "role": role, "content": m.content }));
    }

    messages.push(json!({ "role": "user", "content": message }));
    messages
}

fn parse_completion(json: &Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))?;

    let content = content.trim();
    if content.is_empty() {
        bail!("Completion response was empty");
    }
    Ok(content.to_string())
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn reply(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": build_messages(system_prompt, history, message),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::debug!(attempt, %status, "completion request failed, retrying");
                        last_err = Some(anyhow::anyhow!(
                            "Completion API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Completion API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.into(),
            options: vec![],
            timestamp: 0,
            intent: None,
        }
    }

    #[test]
    fn messages_keep_only_recent_history() {
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| msg(if i % 2 == 0 { Role::User } else { Role::Bot }, &i.to_string()))
            .collect();
        let messages = build_messages("sys", &history, "ultima");
        assert_eq!(messages.len(), 1 + HISTORY_WINDOW + 1);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "4");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages.last().unwrap()["content"], "ultima");
    }

    #[test]
    fn parse_completion_extracts_content() {
        let json = json!({ "choices": [{ "message": { "content": "  Ciao!  " } }] });
        assert_eq!(parse_completion(&json).unwrap(), "Ciao!");
        assert!(parse_completion(&json!({ "choices": [] })).is_err());
        let empty = json!({ "choices": [{ "message": { "content": " " } }] });
        assert!(parse_completion(&empty).is_err());
    }

    #[test]
    fn disabled_provider_builds_nothing() {
        assert!(create_assistant(&AiConfig::default()).unwrap().is_none());
    }
}
