//! The chat engine behind `POST /api/chat`.
//!
//! Each visitor message is classified twice: [`crate::intent`] decides what
//! the visitor wants, [`crate::triage`] decides how urgent it is. The reply
//! comes from the language model when one is configured and from canned
//! replies otherwise. Conversations live in the KV store under
//! `chat:session:<id>` until their TTL lapses.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ai::Assistant;
use crate::config::ChatConfig;
use crate::intent::{classify_intent, default_options, Intent};
use crate::kv::{self, KvStore};
use crate::lead;
use crate::models::{ChatMessage, ChatRequest, ChatSession, Role};
use crate::replies::{self, Reply};
use crate::teams::{LeadAlert, Notifier};
use crate::triage::{self, Category, Priority};
use crate::validate::{is_valid_email, sanitize_input};

const MAX_SESSION_ID_CHARS: usize = 64;
/// User messages after which a conversation is handed to a human.
const LONG_CONVERSATION_MESSAGES: usize = 8;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid chat action")]
    InvalidAction,
    #[error("session {0} reached its message limit")]
    SessionLimit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Ai,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub success: bool,
    pub session_id: String,
    pub response: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub escalate: bool,
    pub escalate_immediately: bool,
    pub lead_score: u8,
    pub source: ReplySource,
    pub step: String,
}

pub fn new_session_id(now_ms: i64) -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("chat_{}_{}", now_ms, suffix)
}

pub fn session_key(id: &str) -> String {
    format!("chat:session:{}", id)
}

/// Accepts a client-supplied id only if it looks like one we issued.
fn usable_session_id(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|id| {
        !id.is_empty()
            && id.len() <= MAX_SESSION_ID_CHARS
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

fn find_email(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | ';' | '(' | ')' | '.' | ':')))
        .find(|w| is_valid_email(w))
        .unwrap_or_default()
        .to_string()
}

pub struct ChatService {
    config: ChatConfig,
    kv: Arc<dyn KvStore>,
    assistant: Option<Arc<dyn Assistant>>,
    notifier: Arc<dyn Notifier>,
}

impl ChatService {
    pub fn new(
        config: ChatConfig,
        kv: Arc<dyn KvStore>,
        assistant: Option<Arc<dyn Assistant>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            kv,
            assistant,
            notifier,
        }
    }

    /// Dispatches a widget request on its `action`.
    pub async fn handle(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        match request.action.as_str() {
            "start" => Ok(self.start(request.session_id.as_deref()).await),
            "message" => {
                let text = request.message.as_deref().unwrap_or_default();
                self.message(request.session_id.as_deref(), text).await
            }
            _ => Err(ChatError::InvalidAction),
        }
    }

    /// Greets the visitor. A live session under `session_id` is resumed
    /// untouched so its message count and notification state carry over.
    pub async fn start(&self, session_id: Option<&str>) -> ChatReply {
        let now = Utc::now().timestamp_millis();
        let greeting = replies::greeting();

        if let Some(id) = usable_session_id(session_id) {
            if let Some(existing) = self.load(id).await {
                tracing::debug!(session = %existing.id, "resuming chat session");
                return greeting_reply(existing, greeting);
            }
        }

        let id = usable_session_id(session_id)
            .map(str::to_string)
            .unwrap_or_else(|| new_session_id(now));
        let mut session = ChatSession::new(id, now);
        session.messages.push(ChatMessage {
            role: Role::Bot,
            content: greeting.message.clone(),
            options: greeting.options.clone(),
            timestamp: now,
            intent: None,
        });
        self.save(&session).await;

        greeting_reply(session, greeting)
    }

    pub async fn message(
        &self,
        session_id: Option<&str>,
        text: &str,
    ) -> Result<ChatReply, ChatError> {
        let text = sanitize_input(text);
        if text.is_empty() {
            return Err(ChatError::InvalidAction);
        }

        let now = Utc::now().timestamp_millis();
        let mut session = match usable_session_id(session_id) {
            Some(id) => self
                .load(id)
                .await
                .unwrap_or_else(|| ChatSession::new(id.to_string(), now)),
            None => ChatSession::new(new_session_id(now), now),
        };

        if session.user_message_count() >= self.config.max_messages_per_session {
            return Err(ChatError::SessionLimit(session.id));
        }

        let history = session.messages.clone();
        let matched = classify_intent(&text);
        let analysis = triage::classify(&text);

        session.messages.push(ChatMessage {
            role: Role::User,
            content: text.clone(),
            options: Vec::new(),
            timestamp: now,
            intent: Some(matched.intent.as_str().to_string()),
        });

        let canned = if analysis.escalate_immediately && matched.intent != Intent::Emergenza {
            replies::for_intent(Intent::Emergenza)
        } else {
            replies::for_intent(matched.intent)
        };

        let (reply, source) = match &self.assistant {
            Some(assistant) => {
                let prompt = triage::build_system_prompt(&analysis);
                match assistant.reply(&prompt, &history, &text).await {
                    Ok(message) => (
                        Reply {
                            message,
                            options: default_options(matched.intent),
                            escalate: canned.escalate,
                        },
                        ReplySource::Ai,
                    ),
                    Err(e) => {
                        tracing::warn!(
                            model = assistant.model_name(),
                            error = %e,
                            "assistant failed, using canned reply"
                        );
                        (canned, ReplySource::Fallback)
                    }
                }
            }
            None => (canned, ReplySource::Fallback),
        };

        let long_conversation = session.user_message_count() >= LONG_CONVERSATION_MESSAGES;
        let escalate = matched.escalate
            || reply.escalate
            || analysis.escalate_immediately
            || long_conversation;
        let lead_score = lead::score(&lead::signals_from_text(&session.user_text()));
        session.lead_score = lead_score;
        session.step = if escalate {
            "escalation".to_string()
        } else {
            triage::flow_for(analysis.category).next_step.to_string()
        };

        session.messages.push(ChatMessage {
            role: Role::Bot,
            content: reply.message.clone(),
            options: reply.options.clone(),
            timestamp: Utc::now().timestamp_millis(),
            intent: Some(matched.intent.as_str().to_string()),
        });

        if (escalate || lead_score >= self.config.escalation_score) && !session.notified {
            let alert = self.alert_for(&session, matched.intent, analysis.priority, &text);
            session.notified = self.notifier.notify(&alert).await;
        }

        self.save(&session).await;

        tracing::debug!(
            session = %session.id,
            intent = matched.intent.as_str(),
            category = analysis.category.as_str(),
            priority = analysis.priority.as_str(),
            escalate,
            lead_score,
            "chat message handled"
        );

        Ok(ChatReply {
            success: true,
            session_id: session.id,
            response: reply.message,
            options: reply.options,
            intent: Some(matched.intent),
            confidence: Some(matched.confidence),
            category: Some(analysis.category),
            priority: Some(analysis.priority),
            escalate,
            escalate_immediately: analysis.escalate_immediately,
            lead_score,
            source,
            step: session.step,
        })
    }

    fn alert_for(
        &self,
        session: &ChatSession,
        intent: Intent,
        priority: Priority,
        latest: &str,
    ) -> LeadAlert {
        let user_text = session.user_text();
        LeadAlert {
            session_id: session.id.clone(),
            nome: String::new(),
            azienda: String::new(),
            email: find_email(&user_text),
            telefono: String::new(),
            zona: String::new(),
            servizio: intent.as_str().to_string(),
            priority,
            lead_score: session.lead_score,
            messages: session.user_message_count(),
            dettagli: latest.to_string(),
        }
    }

    async fn load(&self, id: &str) -> Option<ChatSession> {
        match kv::get_json::<ChatSession>(self.kv.as_ref(), &session_key(id)).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "failed to load chat session, starting fresh");
                None
            }
        }
    }

    async fn save(&self, session: &ChatSession) {
        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        if let Err(e) =
            kv::put_json(self.kv.as_ref(), &session_key(&session.id), session, Some(ttl)).await
        {
            tracing::warn!(session = %session.id, error = %e, "failed to save chat session");
        }
    }
}

fn greeting_reply(session: ChatSession, greeting: Reply) -> ChatReply {
    ChatReply {
        success: true,
        session_id: session.id,
        response: greeting.message,
        options: greeting.options,
        intent: None,
        confidence: None,
        category: None,
        priority: None,
        escalate: false,
        escalate_immediately: false,
        lead_score: session.lead_score,
        source: ReplySource::Fallback,
        step: session.step,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _alert: &LeadAlert) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct FixedAssistant(anyhow::Result<&'static str>);

    #[async_trait]
    impl Assistant for FixedAssistant {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn reply(&self, _: &str, _: &[ChatMessage], _: &str) -> anyhow::Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.to_string()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn service_with(
        config: ChatConfig,
        assistant: Option<Arc<dyn Assistant>>,
    ) -> (ChatService, Arc<CountingNotifier>, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let notifier = Arc::new(CountingNotifier::default());
        let svc = ChatService::new(config, kv.clone(), assistant, notifier.clone());
        (svc, notifier, kv)
    }

    fn service() -> (ChatService, Arc<CountingNotifier>, Arc<MemoryKv>) {
        service_with(ChatConfig::default(), None)
    }

    #[tokio::test]
    async fn start_issues_session_and_greets() {
        let (svc, _, kv) = service();
        let reply = svc.start(None).await;
        assert!(reply.session_id.starts_with("chat_"));
        assert_eq!(reply.step, "greeting");
        assert!(!reply.options.is_empty());
        assert!(kv.get(&session_key(&reply.session_id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ransomware_escalates_immediately() {
        let (svc, notifier, _) = service();
        let reply = svc
            .message(None, "Abbiamo un errore, forse ransomware sul server")
            .await
            .unwrap();
        assert_eq!(reply.priority, Some(Priority::Immediate));
        assert!(reply.escalate_immediately);
        assert!(reply.escalate);
        assert!(reply.response.contains("039 888 2041"));
        assert_eq!(reply.step, "escalation");
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn team_is_notified_once_per_session() {
        let (svc, notifier, _) = service();
        let first = svc.message(None, "malware ovunque").await.unwrap();
        svc.message(Some(&first.session_id), "ancora malware")
            .await
            .unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn plain_question_does_not_escalate() {
        let (svc, notifier, _) = service();
        let reply = svc.message(None, "Fate backup in cloud?").await.unwrap();
        assert_eq!(reply.intent, Some(Intent::Backup));
        assert!(!reply.escalate);
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_message_is_invalid() {
        let (svc, _, _) = service();
        assert!(matches!(
            svc.message(None, "   ").await,
            Err(ChatError::InvalidAction)
        ));
        let unknown = ChatRequest {
            action: "dance".into(),
            session_id: None,
            message: None,
        };
        assert!(matches!(svc.handle(&unknown).await, Err(ChatError::InvalidAction)));
    }

    #[tokio::test]
    async fn session_limit_is_enforced() {
        let config = ChatConfig {
            max_messages_per_session: 2,
            ..ChatConfig::default()
        };
        let (svc, _, _) = service_with(config, None);
        let id = svc.start(None).await.session_id;
        svc.message(Some(&id), "ciao").await.unwrap();
        svc.message(Some(&id), "ciao di nuovo").await.unwrap();
        assert!(matches!(
            svc.message(Some(&id), "terzo").await,
            Err(ChatError::SessionLimit(_))
        ));
    }

    #[tokio::test]
    async fn restarting_a_live_session_keeps_its_history() {
        let config = ChatConfig {
            max_messages_per_session: 2,
            ..ChatConfig::default()
        };
        let (svc, notifier, _) = service_with(config, None);
        let id = svc.start(None).await.session_id;
        svc.message(Some(&id), "malware sul server").await.unwrap();
        svc.message(Some(&id), "ancora problemi").await.unwrap();
        assert!(matches!(
            svc.message(Some(&id), "terzo").await,
            Err(ChatError::SessionLimit(_))
        ));

        let restarted = svc.start(Some(&id)).await;
        assert_eq!(restarted.session_id, id);
        assert_ne!(restarted.step, "greeting");
        assert!(matches!(
            svc.message(Some(&id), "quattro").await,
            Err(ChatError::SessionLimit(_))
        ));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_client_session_id_is_started_fresh() {
        let (svc, _, kv) = service();
        let reply = svc.start(Some("widget_123")).await;
        assert_eq!(reply.session_id, "widget_123");
        assert_eq!(reply.step, "greeting");
        assert!(kv.get(&session_key("widget_123")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn request_for_a_person_escalates() {
        let (svc, notifier, _) = service();
        let reply = svc
            .message(None, "vorrei parlare con un operatore umano")
            .await
            .unwrap();
        assert_eq!(reply.intent, Some(Intent::HumanRequest));
        assert!(reply.escalate);
        assert_eq!(reply.step, "escalation");
        assert!(reply.response.contains("039 888 2041"));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn long_conversations_escalate() {
        let (svc, notifier, _) = service();
        let id = svc.start(None).await.session_id;
        for i in 1..LONG_CONVERSATION_MESSAGES {
            let reply = svc
                .message(Some(&id), &format!("domanda {i}"))
                .await
                .unwrap();
            assert!(!reply.escalate, "message {i}");
        }
        let last = svc.message(Some(&id), "ultima domanda").await.unwrap();
        assert!(last.escalate);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lead_score_accumulates_across_messages() {
        let (svc, _, _) = service();
        let first = svc.message(None, "Siamo a Vimercate").await.unwrap();
        assert_eq!(first.lead_score, 35);
        let second = svc
            .message(Some(&first.session_id), "abbiamo 30 dipendenti")
            .await
            .unwrap();
        assert_eq!(second.lead_score, 60);
    }

    #[tokio::test]
    async fn assistant_reply_is_used_and_failure_falls_back() {
        let ok: Arc<dyn Assistant> = Arc::new(FixedAssistant(Ok("Risposta AI")));
        let (svc, _, _) = service_with(ChatConfig::default(), Some(ok));
        let reply = svc.message(None, "Fate backup?").await.unwrap();
        assert_eq!(reply.response, "Risposta AI");
        assert_eq!(reply.source, ReplySource::Ai);

        let failing: Arc<dyn Assistant> =
            Arc::new(FixedAssistant(Err(anyhow::anyhow!("timeout"))));
        let (svc, _, _) = service_with(ChatConfig::default(), Some(failing));
        let reply = svc.message(None, "Fate backup?").await.unwrap();
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.response.contains("Backup"));
    }

    #[test]
    fn foreign_session_ids_are_ignored() {
        assert_eq!(usable_session_id(Some("chat_1_abc")), Some("chat_1_abc"));
        assert_eq!(usable_session_id(Some("  ")), None);
        assert_eq!(usable_session_id(Some("../../etc")), None);
        assert!(new_session_id(42).starts_with("chat_42_"));
        assert_eq!(new_session_id(42).len(), "chat_42_".len() + 9);
    }

    #[test]
    fn email_is_found_in_free_text() {
        assert_eq!(find_email("scrivetemi a anna@example.it, grazie"), "anna@example.it");
        assert_eq!(find_email("nessun contatto"), "");
    }
}
