//! Sales intent of a chat message.
//!
//! Orthogonal to [`crate::triage`]: triage answers "how bad is it", intent
//! answers "what does the visitor want from us".

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Preventivo,
    Emergenza,
    HumanRequest,
    Sicurezza,
    Supporto,
    Backup,
    Riparazione,
    Contatti,
    Generale,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Preventivo => "preventivo",
            Intent::Emergenza => "emergenza",
            Intent::HumanRequest => "human_request",
            Intent::Sicurezza => "sicurezza",
            Intent::Supporto => "supporto",
            Intent::Backup => "backup",
            Intent::Riparazione => "riparazione",
            Intent::Contatti => "contatti",
            Intent::Generale => "generale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntentMatch {
    pub intent: Intent,
    pub confidence: f32,
    pub escalate: bool,
}

const RULES: &[(Intent, &[&str], f32, bool)] = &[
    (
        Intent::Preventivo,
        &["preventivo", "prezzo", "costo", "quanto costa"],
        0.9,
        true,
    ),
    (
        Intent::Emergenza,
        &["emergenza", "urgente", "server down", "malware"],
        0.9,
        true,
    ),
    (
        Intent::HumanRequest,
        &["umano", "operatore", "una persona", "parlare con", "un tecnico"],
        0.9,
        true,
    ),
    (Intent::Sicurezza, &["sicurezza", "firewall", "watchguard"], 0.8, false),
    (
        Intent::Supporto,
        &["assistenza", "supporto", "aiuto", "problema"],
        0.8,
        false,
    ),
    (Intent::Backup, &["backup", "recovery", "dati"], 0.8, false),
    (
        Intent::Riparazione,
        &["riparazione", "pc", "mac", "laptop"],
        0.8,
        false,
    ),
    (
        Intent::Contatti,
        &["contatti", "telefono", "email", "dove siete"],
        0.8,
        false,
    ),
];

pub fn classify_intent(message: &str) -> IntentMatch {
    let msg = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords, _, _)| keywords.iter().any(|k| msg.contains(k)))
        .map(|&(intent, _, confidence, escalate)| IntentMatch {
            intent,
            confidence,
            escalate,
        })
        .unwrap_or(IntentMatch {
            intent: Intent::Generale,
            confidence: 0.5,
            escalate: false,
        })
}

/// Quick-reply chips shown under a reply for `intent`.
pub fn default_options(intent: Intent) -> Vec<String> {
    let options: &[&str] = match intent {
        Intent::Backup => &["☁️ Backup cloud", "🔄 Disaster recovery", "💰 Preventivo"],
        Intent::Preventivo => &["📋 Compila richiesta", "📞 Chiama ora", "📧 Invia email"],
        Intent::Supporto => &[
            "💻 Assistenza remota",
            "🏢 Intervento on-site",
            "📋 Contratto manutenzione",
        ],
        Intent::Emergenza => &[
            "📞 Chiama ora: 039 888 2041",
            "💥 Descrivi il problema",
            "🚨 Richiedi intervento",
        ],
        Intent::HumanRequest => &["📞 Chiama ora: 039 888 2041", "📧 Ricontattatemi via email"],
        Intent::Sicurezza => &["🛡️ Firewall", "🦠 Antivirus", "🔍 Security audit"],
        _ => &["💼 Servizi IT-ERA", "🔒 Sicurezza", "💻 Assistenza", "💰 Preventivo"],
    };
    options.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_requests_escalate() {
        let m = classify_intent("Quanto costa un firewall?");
        assert_eq!(m.intent, Intent::Preventivo);
        assert!(m.escalate);
        assert!((m.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn rule_order_decides_ties() {
        // "urgente" (emergenza) is checked before "backup"
        assert_eq!(classify_intent("backup urgente").intent, Intent::Emergenza);
        // "firewall" (sicurezza) before "problema" (supporto)
        assert_eq!(classify_intent("problema col firewall").intent, Intent::Sicurezza);
    }

    #[test]
    fn asking_for_a_person_escalates() {
        for text in [
            "vorrei parlare con un operatore umano",
            "posso sentire una persona?",
            "mi serve un tecnico",
        ] {
            let m = classify_intent(text);
            assert_eq!(m.intent, Intent::HumanRequest, "{text}");
            assert!(m.escalate);
        }
        // "personalizzato" alone is not a request for a person
        assert_eq!(
            classify_intent("consulenza personalizzata").intent,
            Intent::Generale
        );
        assert_eq!(
            serde_json::to_value(Intent::HumanRequest).unwrap(),
            serde_json::json!("human_request")
        );
    }

    #[test]
    fn unknown_text_is_general() {
        let m = classify_intent("buonasera");
        assert_eq!(m.intent, Intent::Generale);
        assert!(!m.escalate);
        assert_eq!(default_options(m.intent).len(), 4);
    }
}
