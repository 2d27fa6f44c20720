//! The contact form pipeline behind `POST /api/contact`.
//!
//! ```text
//! ContactRequest ─▶ validate ─▶ sanitise ─▶ notify team ─┬─▶ receipt
//!                                              │ 403     │
//!                                              ▼         ├─▶ confirmation (optional)
//!                                        fallback sender ├─▶ contacts table
//!                                                        └─▶ leads:<date> counter
//! ```
//!
//! Only the team notification can fail the request. Everything after it is
//! best effort and logged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AnalyticsConfig, EmailConfig};
use crate::contacts::ContactStore;
use crate::kv::KvStore;
use crate::lead;
use crate::mailer::{mailbox, EmailTag, MailError, Mailer, OutgoingEmail, SentEmail};
use crate::models::{ContactRequest, ContactSubmission, RequestMeta};
use crate::templates::{ContactEmailContext, Templates};
use crate::validate::{sanitize_contact, validate_contact};

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("invalid contact request: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("email delivery failed: {message}")]
    Delivery { message: String, status: Option<u16> },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactReceipt {
    pub ticket_id: String,
    pub email_id: String,
    pub used_fallback: bool,
    pub lead_score: u8,
    pub message: String,
}

pub fn ticket_id(now: DateTime<Utc>) -> String {
    format!("ITERA-{}", now.timestamp_millis())
}

pub fn analytics_key(now: DateTime<Utc>) -> String {
    format!("leads:{}", now.format("%Y-%m-%d"))
}

pub struct ContactService {
    email: EmailConfig,
    analytics: AnalyticsConfig,
    mailer: Arc<dyn Mailer>,
    templates: Templates,
    store: Option<ContactStore>,
    kv: Arc<dyn KvStore>,
}

impl ContactService {
    pub fn new(
        email: EmailConfig,
        analytics: AnalyticsConfig,
        mailer: Arc<dyn Mailer>,
        store: Option<ContactStore>,
        kv: Arc<dyn KvStore>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            email,
            analytics,
            mailer,
            templates: Templates::new()?,
            store,
            kv,
        })
    }

    pub async fn submit(
        &self,
        request: &ContactRequest,
        meta: &RequestMeta,
    ) -> Result<ContactReceipt, ContactError> {
        let errors = validate_contact(request);
        if !errors.is_empty() {
            return Err(ContactError::Invalid(errors));
        }

        let sub = sanitize_contact(request);
        let now = Utc::now();
        let ticket = ticket_id(now);
        let lead_score = lead::score(&lead::signals_from_contact(&sub));

        let ctx = ContactEmailContext {
            ticket_id: &ticket,
            contact: &sub,
            lead_score,
            lead_quality: lead::quality(lead_score).label,
            submitted_at: now.format("%d/%m/%Y %H:%M UTC").to_string(),
            urgent: sub.is_urgent(),
        };

        let (sent, used_fallback) = self.notify_team(&sub, &ctx).await?;
        tracing::info!(
            ticket = %ticket,
            email_id = %sent.id,
            used_fallback,
            lead_score,
            ip = %meta.ip,
            user_agent = meta.user_agent.as_deref().unwrap_or("-"),
            "contact request delivered"
        );

        if self.email.send_confirmation && !used_fallback {
            self.send_confirmation(&sub, &ctx).await;
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.insert(&sub, &ticket, lead_score, &meta.ip).await {
                tracing::error!(ticket = %ticket, error = %e, "failed to store contact");
            }
        }

        if self.analytics.enabled {
            let ttl = Duration::from_secs(self.analytics.retention_days.saturating_mul(86_400));
            if let Err(e) = self.kv.increment(&analytics_key(now), ttl).await {
                tracing::warn!(error = %e, "failed to update lead counter");
            }
        }

        let message = if used_fallback {
            "Richiesta registrata! (Sistema in modalità test - verifica dominio in corso)"
        } else {
            "Richiesta inviata con successo! Ti contatteremo entro 2 ore lavorative."
        };

        Ok(ContactReceipt {
            ticket_id: ticket,
            email_id: sent.id,
            used_fallback,
            lead_score,
            message: message.to_string(),
        })
    }

    fn team_email(
        &self,
        sub: &ContactSubmission,
        ctx: &ContactEmailContext<'_>,
    ) -> anyhow::Result<OutgoingEmail> {
        let form_type = if sub.form_type.is_empty() {
            None
        } else {
            Some(sub.form_type.as_str())
        };

        Ok(OutgoingEmail {
            from: mailbox(&self.email.from_name, &self.email.from),
            to: vec![self.email.to.clone()],
            reply_to: Some(sub.email.clone()),
            subject: format!(
                "{} {} - {}",
                self.email.subject_prefix,
                form_type.unwrap_or("Richiesta"),
                sub.nome
            ),
            html: self.templates.notification_html(ctx)?,
            text: self.templates.notification_text(ctx)?,
            tags: vec![
                EmailTag::new("source", "website"),
                EmailTag::new("type", form_type.unwrap_or("contact")),
            ],
        })
    }

    /// Sends the team notification, retrying once through the fallback
    /// sender when the primary domain is unverified.
    async fn notify_team(
        &self,
        sub: &ContactSubmission,
        ctx: &ContactEmailContext<'_>,
    ) -> Result<(SentEmail, bool), ContactError> {
        let primary = self.team_email(sub, ctx)?;

        let first = self.mailer.send(&primary).await;
        match first {
            Ok(sent) => Ok((sent, false)),
            Err(e) if e.is_unverified_domain() => {
                tracing::warn!("sender domain not verified, retrying with fallback sender");
                let fallback = self.fallback_email(primary);
                self.mailer
                    .send(&fallback)
                    .await
                    .map(|sent| (sent, true))
                    .map_err(delivery_error)
            }
            Err(e) => Err(delivery_error(e)),
        }
    }

    fn fallback_email(&self, mut email: OutgoingEmail) -> OutgoingEmail {
        let note = format!(
            "Nota: Email inviata tramite sistema di test. Destinatario finale: {}",
            self.email.to
        );
        email.from = mailbox(&self.email.from_name, &self.email.from_fallback);
        email.to = vec![self.email.to_test.clone()];
        email.html.push_str(&format!(
            "<p style=\"color:#999;font-size:10px;margin-top:20px;\">{}</p>",
            note
        ));
        email.text.push_str(&format!("\n\n{}", note));
        email.tags.push(EmailTag::new("fallback", "true"));
        email
    }

    async fn send_confirmation(&self, sub: &ContactSubmission, ctx: &ContactEmailContext<'_>) {
        let html = match self.templates.confirmation_html(ctx) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(error = %e, "failed to render confirmation email");
                return;
            }
        };

        let email = OutgoingEmail {
            from: mailbox(&self.email.from_name, &self.email.from),
            to: vec![sub.email.clone()],
            reply_to: Some(self.email.reply_to.clone()),
            subject: format!("✅ Richiesta ricevuta - {}", ctx.ticket_id),
            text: format!(
                "Ciao {},\n\nabbiamo ricevuto la tua richiesta ({}). Ti contatteremo entro 4 ore lavorative.\n\nIT-ERA - 039 888 2041",
                sub.nome, ctx.ticket_id
            ),
            html,
            tags: vec![EmailTag::new("source", "website"), EmailTag::new("type", "confirmation")],
        };

        if let Err(e) = self.mailer.send(&email).await {
            tracing::warn!(ticket = %ctx.ticket_id, error = %e, "confirmation email not sent");
        }
    }
}

fn delivery_error(e: MailError) -> ContactError {
    match e {
        MailError::MissingApiKey(_) => ContactError::Internal(e.into()),
        MailError::Rejected {
            status, message, ..
        } => ContactError::Delivery {
            message,
            status: Some(status),
        },
        MailError::Transport(message) => ContactError::Delivery {
            message,
            status: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted results and records every message it was handed.
    struct ScriptedMailer {
        results: Mutex<Vec<Result<SentEmail, MailError>>>,
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl ScriptedMailer {
        fn new(mut results: Vec<Result<SentEmail, MailError>>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self {
                results: Mutex::new(results),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for ScriptedMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, MailError> {
            self.sent.lock().unwrap().push(email.clone());
            self.results.lock().unwrap().pop().unwrap_or(Ok(SentEmail {
                id: "default".into(),
            }))
        }
    }

    fn ok(id: &str) -> Result<SentEmail, MailError> {
        Ok(SentEmail { id: id.into() })
    }

    fn unverified() -> Result<SentEmail, MailError> {
        Err(MailError::Rejected {
            status: 403,
            message: "You can only send testing emails".into(),
            body: r#"{"message":"You can only send testing emails to your own email address"}"#.into(),
        })
    }

    fn service(mailer: Arc<ScriptedMailer>, email: EmailConfig, kv: Arc<MemoryKv>) -> ContactService {
        ContactService::new(email, AnalyticsConfig::default(), mailer, None, kv).unwrap()
    }

    fn request() -> ContactRequest {
        ContactRequest {
            nome: Some("Mario Rossi".into()),
            email: Some("mario@example.it".into()),
            telefono: Some("333 1234567".into()),
            comune: Some("Vimercate".into()),
            form_type: Some("preventivo".into()),
            privacy: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_request_sends_nothing() {
        let mailer = ScriptedMailer::new(vec![]);
        let svc = service(mailer.clone(), EmailConfig::default(), Arc::new(MemoryKv::new()));
        let err = svc
            .submit(&ContactRequest::default(), &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ContactError::Invalid(ref e) if e.len() == 4));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn name_that_sanitises_to_nothing_is_rejected() {
        let mailer = ScriptedMailer::new(vec![]);
        let svc = service(mailer.clone(), EmailConfig::default(), Arc::new(MemoryKv::new()));
        let req = ContactRequest {
            nome: Some("<>".into()),
            ..request()
        };
        let err = svc.submit(&req, &RequestMeta::default()).await.unwrap_err();
        assert!(matches!(err, ContactError::Invalid(ref e) if e.len() == 1));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn primary_delivery_builds_expected_message() {
        let mailer = ScriptedMailer::new(vec![ok("em_1")]);
        let kv = Arc::new(MemoryKv::new());
        let svc = service(mailer.clone(), EmailConfig::default(), kv.clone());

        let receipt = svc.submit(&request(), &RequestMeta::default()).await.unwrap();
        assert!(receipt.ticket_id.starts_with("ITERA-"));
        assert_eq!(receipt.email_id, "em_1");
        assert!(!receipt.used_fallback);
        assert_eq!(receipt.lead_score, 35);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "IT-ERA <info@it-era.it>");
        assert_eq!(sent[0].reply_to.as_deref(), Some("mario@example.it"));
        assert_eq!(sent[0].subject, "[IT-ERA] preventivo - Mario Rossi");
        assert!(sent[0].tags.contains(&EmailTag::new("type", "preventivo")));

        let counter = kv.get(&analytics_key(Utc::now())).await.unwrap();
        assert_eq!(counter.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn unverified_domain_retries_once_through_fallback() {
        let mailer = ScriptedMailer::new(vec![unverified(), ok("em_fb")]);
        let email = EmailConfig {
            to_test: "owner@example.com".into(),
            send_confirmation: true,
            ..EmailConfig::default()
        };
        let svc = service(mailer.clone(), email, Arc::new(MemoryKv::new()));

        let receipt = svc.submit(&request(), &RequestMeta::default()).await.unwrap();
        assert!(receipt.used_fallback);
        assert_eq!(receipt.email_id, "em_fb");

        // no confirmation on the fallback path
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].from, "IT-ERA <onboarding@resend.dev>");
        assert_eq!(sent[1].to, vec!["owner@example.com"]);
        assert!(sent[1].text.contains("Destinatario finale: info@it-era.it"));
        assert!(sent[1].tags.contains(&EmailTag::new("fallback", "true")));
    }

    #[tokio::test]
    async fn failed_fallback_is_a_delivery_error() {
        let mailer = ScriptedMailer::new(vec![unverified(), unverified()]);
        let svc = service(mailer.clone(), EmailConfig::default(), Arc::new(MemoryKv::new()));
        let err = svc.submit(&request(), &RequestMeta::default()).await.unwrap_err();
        assert!(matches!(err, ContactError::Delivery { status: Some(403), .. }));
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn other_rejections_are_not_retried() {
        let mailer = ScriptedMailer::new(vec![Err(MailError::Rejected {
            status: 422,
            message: "Invalid `to` field".into(),
            body: String::new(),
        })]);
        let svc = service(mailer.clone(), EmailConfig::default(), Arc::new(MemoryKv::new()));
        let err = svc.submit(&request(), &RequestMeta::default()).await.unwrap_err();
        match err {
            ContactError::Delivery { message, status } => {
                assert_eq!(message, "Invalid `to` field");
                assert_eq!(status, Some(422));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn confirmation_goes_to_customer_when_enabled() {
        let mailer = ScriptedMailer::new(vec![ok("team"), ok("customer")]);
        let email = EmailConfig {
            send_confirmation: true,
            ..EmailConfig::default()
        };
        let svc = service(mailer.clone(), email, Arc::new(MemoryKv::new()));
        svc.submit(&request(), &RequestMeta::default()).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, vec!["mario@example.it"]);
        assert!(sent[1].subject.starts_with("✅ Richiesta ricevuta - ITERA-"));
    }
}
