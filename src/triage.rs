//! Support triage: maps a free-text message to a support category, a
//! priority and an escalation flag, and owns the conversation flow and
//! system prompt for each category.
//!
//! Classification is first-match-wins over an ordered list of keyword
//! sets. Every message is classified on its own; session history never
//! influences the category.
//!
//! ```text
//! message ─▶ lowercase ─▶ error? ─▶ hardware? ─▶ network? ─▶ security? ─▶ equipment? ─▶ general
//!                                   │
//!                                   ▼
//!                       escalation triggers (override)
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ErrorAnalysis,
    HardwareIdentification,
    NetworkAnalysis,
    SecurityAnalysis,
    EquipmentIdentification,
    GeneralAnalysis,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::ErrorAnalysis => "error_analysis",
            Category::HardwareIdentification => "hardware_identification",
            Category::NetworkAnalysis => "network_analysis",
            Category::SecurityAnalysis => "security_analysis",
            Category::EquipmentIdentification => "equipment_identification",
            Category::GeneralAnalysis => "general_analysis",
        }
    }

    fn focus(self) -> &'static str {
        match self {
            Category::ErrorAnalysis => "error_resolution",
            Category::HardwareIdentification => "hardware_diagnosis",
            Category::NetworkAnalysis => "network_troubleshooting",
            Category::SecurityAnalysis => "security_incident",
            Category::EquipmentIdentification => "device_identification",
            Category::GeneralAnalysis => "general_support",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most urgent so `max` picks the stronger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Immediate,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Immediate => "immediate",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportAnalysis {
    pub category: Category,
    pub priority: Priority,
    pub escalate_immediately: bool,
    pub focus: &'static str,
}

const ERROR_KEYWORDS: &[&str] = &[
    "errore", "error", "exception", "crash", "bug", "problema", "non funziona", "popup",
    "messaggio", "alert", "warning", "schermata blu", "freeze",
];

const HARDWARE_KEYWORDS: &[&str] = &[
    "hardware", "computer", "pc", "laptop", "server", "scheda madre", "componente", "rotto",
    "danneggiato", "riparazione", "sostituzione",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "rete", "network", "wifi", "internet", "connessione", "router", "switch", "diagramma",
    "topologia", "configurazione", "firewall",
];

const SECURITY_KEYWORDS: &[&str] = &[
    "sicurezza", "security", "virus", "malware", "ransomware", "hack", "firewall", "antivirus",
    "phishing", "spam", "minaccia", "alert",
];

const EQUIPMENT_KEYWORDS: &[&str] = &[
    "modello", "marca", "identificare", "riconoscere", "che cos'è", "tipo", "specifiche",
    "etichetta", "seriale", "compatibilità",
];

const CRITICAL_ERRORS: &[&str] = &["server down", "produzione", "critico", "malware", "data loss"];
const CRITICAL_HARDWARE: &[&str] = &["server", "non si accende", "fumo", "bruciato", "produzione"];
const CRITICAL_NETWORK: &[&str] = &["rete down", "firewall", "sicurezza", "attacco", "hacker"];

/// Force `immediate` priority and escalation whatever the category.
const IMMEDIATE_TRIGGERS: &[&str] = &["malware", "ransomware", "data breach", "server down"];
/// Raise priority to at least `high`.
const HIGH_TRIGGERS: &[&str] = &["hardware failure", "network outage", "critical error"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Lowercases and treats `_` as a space so `server_down` and `server down`
/// match the same triggers.
fn normalize(message: &str) -> String {
    message.to_lowercase().replace('_', " ")
}

fn error_priority(msg: &str) -> Priority {
    if contains_any(msg, &["server", "critico", "produzione"]) {
        Priority::Immediate
    } else if contains_any(msg, &["urgente", "bloccato", "non lavoro"]) {
        Priority::High
    } else {
        Priority::Medium
    }
}

fn hardware_priority(msg: &str) -> Priority {
    if contains_any(msg, &["server", "non si accende"]) {
        Priority::High
    } else if contains_any(msg, &["lento", "rumore"]) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn network_priority(msg: &str) -> Priority {
    if contains_any(msg, &["down", "non funziona", "ufficio"]) {
        Priority::High
    } else {
        Priority::Medium
    }
}

/// Classifies a single message.
pub fn classify(message: &str) -> SupportAnalysis {
    let msg = normalize(message);

    let (category, priority, escalate) = if contains_any(&msg, ERROR_KEYWORDS) {
        (
            Category::ErrorAnalysis,
            error_priority(&msg),
            contains_any(&msg, CRITICAL_ERRORS),
        )
    } else if contains_any(&msg, HARDWARE_KEYWORDS) {
        (
            Category::HardwareIdentification,
            hardware_priority(&msg),
            contains_any(&msg, CRITICAL_HARDWARE),
        )
    } else if contains_any(&msg, NETWORK_KEYWORDS) {
        (
            Category::NetworkAnalysis,
            network_priority(&msg),
            contains_any(&msg, CRITICAL_NETWORK),
        )
    } else if contains_any(&msg, SECURITY_KEYWORDS) {
        (Category::SecurityAnalysis, Priority::Immediate, true)
    } else if contains_any(&msg, EQUIPMENT_KEYWORDS) {
        (Category::EquipmentIdentification, Priority::Medium, false)
    } else {
        (Category::GeneralAnalysis, Priority::Medium, false)
    };

    let (priority, escalate) = if contains_any(&msg, IMMEDIATE_TRIGGERS) {
        (Priority::Immediate, true)
    } else if contains_any(&msg, HIGH_TRIGGERS) {
        (priority.max(Priority::High), escalate)
    } else {
        (priority, escalate)
    };

    SupportAnalysis {
        category,
        priority,
        escalate_immediately: escalate,
        focus: category.focus(),
    }
}

/// Scripted conversation flow for a support category.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub name: &'static str,
    pub next_step: &'static str,
    pub suggestions: &'static [&'static str],
    pub follow_up_questions: &'static [&'static str],
    #[serde(skip)]
    pub instructions: &'static str,
}

pub fn flow_for(category: Category) -> Flow {
    match category {
        Category::ErrorAnalysis => Flow {
            name: "error_analysis",
            next_step: "analyze_error_screenshot",
            suggestions: &[
                "🔍 Analizza lo screenshot dell'errore",
                "🛠️ Proponi soluzione immediata",
                "📞 Escalation per supporto remoto",
                "🆘 Intervento tecnico urgente",
            ],
            follow_up_questions: &[
                "Quando è apparso questo errore per la prima volta?",
                "L'errore si ripresenta sistematicamente?",
                "Avete fatto modifiche recenti al sistema?",
                "Altri utenti hanno lo stesso problema?",
            ],
            instructions: "ANALISI ERRORE - FOCUS:
1. Identifica precisamente il tipo di errore mostrato
2. Determina la gravità e l'impatto sul business
3. Proponi soluzioni immediate se possibili
4. Escalation rapida per errori critici

DOMANDE CHIAVE:
- Codice errore specifico
- Quando si verifica (startup, runtime, shutdown)
- Frequenza del problema
- Impatto sulla produttività",
        },
        Category::HardwareIdentification => Flow {
            name: "hardware_identification",
            next_step: "identify_hardware_specs",
            suggestions: &[
                "💻 Identifica modello e specifiche",
                "🔧 Diagnosi problema hardware",
                "💰 Preventivo riparazione",
                "🔄 Opzioni sostituzione",
            ],
            follow_up_questions: &[
                "Il dispositivo è ancora in garanzia?",
                "Quando è iniziato il problema?",
                "Il dispositivo è critico per il lavoro?",
                "Preferite riparazione o sostituzione?",
            ],
            instructions: "IDENTIFICAZIONE HARDWARE - FOCUS:
1. Riconosci marca, modello, anno del dispositivo
2. Identifica eventuali danni visibili
3. Stima età e valore del dispositivo
4. Valuta convenienza riparazione vs sostituzione

INFORMAZIONI DA RACCOGLIERE:
- Tipo dispositivo (PC, laptop, server, periferica)
- Marca e modello specifico
- Sintomi del problema
- Urgenza della riparazione",
        },
        Category::NetworkAnalysis => Flow {
            name: "network_analysis",
            next_step: "analyze_network_topology",
            suggestions: &[
                "🌐 Analizza topologia di rete",
                "🔒 Valuta sicurezza configurazione",
                "⚡ Ottimizzazione performance",
                "🛡️ Implementazione firewall",
            ],
            follow_up_questions: &[
                "Quanti utenti utilizzano la rete?",
                "Ci sono problemi di velocità o connettività?",
                "Avete un firewall aziendale?",
                "Servono configurazioni particolari?",
            ],
            instructions: "ANALISI RETE - FOCUS:
1. Esamina topologia e configurazione mostrata
2. Identifica possibili bottleneck o problemi
3. Suggerisci ottimizzazioni di sicurezza
4. Proponi soluzioni WatchGuard se appropriato

SPECIALIZZAZIONE IT-ERA:
- Partner WatchGuard certificato
- Esperienza reti PMI Lombardia
- Focus sicurezza e performance
- Configurazioni personalizzate",
        },
        Category::SecurityAnalysis => Flow {
            name: "security_analysis",
            next_step: "immediate_security_assessment",
            suggestions: &[
                "🚨 Valutazione immediata minaccia",
                "🛡️ Implementazione contromisure",
                "📞 Supporto emergenza 24/7",
                "🔒 Audit sicurezza completo",
            ],
            follow_up_questions: &[
                "Avete già isolato il sistema interessato?",
                "Ci sono dati sensibili a rischio?",
                "Avete un backup recente dei dati?",
                "È il primo incidente di questo tipo?",
            ],
            instructions: "ANALISI SICUREZZA - PRIORITÀ MASSIMA:
1. Valuta immediatamente il livello di minaccia
2. Suggerisci azioni immediate di contenimento
3. Escalation IMMEDIATA per incidenti gravi
4. Proponi audit sicurezza post-incidente

PROTOCOLLO EMERGENZA:
- Isolamento sistema se necessario
- Backup immediato dati critici
- Analisi forense se richiesta
- Piano recovery post-incidente",
        },
        Category::EquipmentIdentification => Flow {
            name: "equipment_identification",
            next_step: "identify_device_specs",
            suggestions: &[
                "🏷️ Identifica modello e specifiche",
                "📋 Compatibilità software/driver",
                "💰 Valutazione dispositivo",
                "🔄 Opzioni upgrade",
            ],
            follow_up_questions: &[
                "Dovete installare software specifico?",
                "Cercate driver o documentazione?",
                "Il dispositivo funziona correttamente?",
                "Serve supporto per la configurazione?",
            ],
            instructions: "IDENTIFICAZIONE DISPOSITIVO - FOCUS:
1. Riconosci marca, modello, specifiche tecniche
2. Fornisci informazioni su compatibilità
3. Suggerisci driver o software necessari
4. Valuta se serve supporto specializzato",
        },
        Category::GeneralAnalysis => Flow {
            name: "general_analysis",
            next_step: "general_analysis",
            suggestions: &[
                "🔍 Analisi generale del problema",
                "💡 Suggerimenti personalizzati",
                "📞 Consulenza specializzata",
                "📋 Preventivo dettagliato",
            ],
            follow_up_questions: &[
                "Puoi descrivere meglio il problema?",
                "Da quanto tempo si verifica?",
                "Hai provato qualche soluzione?",
                "È urgente risolverlo?",
            ],
            instructions: "ANALISI GENERALE - APPROCCIO:
1. Identifica gli elementi tecnici rilevanti
2. Poni domande mirate per approfondire
3. Indirizza verso il servizio più appropriato

SERVIZI IT-ERA:
- Assistenza tecnica generale
- Consulenza IT personalizzata
- Riparazione hardware certificata
- Soluzioni aziendali complete",
        },
    }
}

/// Builds the system prompt handed to the language model for a message
/// classified as `analysis`.
pub fn build_system_prompt(analysis: &SupportAnalysis) -> String {
    let flow = flow_for(analysis.category);
    let escalation = if analysis.escalate_immediately {
        "🚨 ESCALATION IMMEDIATA RICHIESTA\n"
    } else {
        ""
    };

    format!(
        "Sei l'assistente tecnico di IT-ERA per problemi informatici di aziende e professionisti.

🎯 SCENARIO CORRENTE: {scenario}
🔎 FOCUS: {focus}
⚡ PRIORITÀ: {priority}
{escalation}
{instructions}

💡 ISTRUZIONI:
1. Correla la richiesta con lo scenario indicato
2. Fornisci una diagnosi precisa e soluzioni immediate quando possibile
3. Usa un linguaggio tecnico ma accessibile
4. Rispondi in italiano, in modo conciso

🏢 SPECIALIZZAZIONI IT-ERA:
• Partner WatchGuard certificato (firewall enterprise)
• Riparazione hardware certificata (PC, Mac, server)
• Assistenza reti PMI Lombardia (Vimercate, Monza, Brianza)
• Backup e disaster recovery cloud
• Consulenza IT personalizzata

📞 CONTATTO: 039 888 2041 | info@it-era.it
📍 SEDE: Viale Risorgimento 32, Vimercate MB",
        scenario = analysis.category.as_str().to_uppercase(),
        focus = analysis.focus,
        priority = analysis.priority.as_str().to_uppercase(),
        escalation = escalation,
        instructions = flow.instructions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ransomware_is_always_immediate() {
        for msg in [
            "abbiamo un ransomware",
            "errore strano, forse ransomware?",
            "il pc è lento, credo sia un malware",
            "la rete è lenta da quando abbiamo preso un MALWARE",
            "server_down in sede",
        ] {
            let a = classify(msg);
            assert_eq!(a.priority, Priority::Immediate, "{}", msg);
            assert!(a.escalate_immediately, "{}", msg);
        }
    }

    #[test]
    fn first_match_wins() {
        // "problema" (error) beats "laptop" (hardware)
        assert_eq!(classify("problema col laptop").category, Category::ErrorAnalysis);
        // "pc" (hardware) beats "wifi" (network)
        assert_eq!(classify("il pc non prende il wifi").category, Category::HardwareIdentification);
        // "firewall" is both network and security; network comes first
        assert_eq!(classify("configurare il firewall").category, Category::NetworkAnalysis);
    }

    #[test]
    fn error_priorities() {
        assert_eq!(classify("errore in produzione").priority, Priority::Immediate);
        assert_eq!(classify("errore, sono bloccato").priority, Priority::High);
        assert_eq!(classify("errore all'avvio").priority, Priority::Medium);
        assert!(classify("errore critico").escalate_immediately);
        assert!(!classify("errore all'avvio").escalate_immediately);
    }

    #[test]
    fn hardware_priorities() {
        let a = classify("il computer non si accende");
        assert_eq!(a.category, Category::HardwareIdentification);
        assert_eq!(a.priority, Priority::High);
        assert!(a.escalate_immediately);
        assert_eq!(classify("laptop lento").priority, Priority::Medium);
        assert_eq!(classify("sostituzione laptop").priority, Priority::Low);
    }

    #[test]
    fn network_priorities() {
        let a = classify("internet in ufficio");
        assert_eq!(a.category, Category::NetworkAnalysis);
        assert_eq!(a.priority, Priority::High);
        assert_eq!(classify("wifi intermittente").priority, Priority::Medium);
    }

    #[test]
    fn security_escalates() {
        let a = classify("ricevuto una mail di phishing");
        assert_eq!(a.category, Category::SecurityAnalysis);
        assert_eq!(a.priority, Priority::Immediate);
        assert!(a.escalate_immediately);
        assert_eq!(a.focus, "security_incident");
    }

    #[test]
    fn equipment_and_general() {
        assert_eq!(
            classify("qual è il seriale della stampante").category,
            Category::EquipmentIdentification
        );
        let a = classify("buongiorno");
        assert_eq!(a.category, Category::GeneralAnalysis);
        assert_eq!(a.priority, Priority::Medium);
        assert!(!a.escalate_immediately);
    }

    #[test]
    fn high_trigger_raises_priority() {
        let a = classify("sospetto hardware failure sul portatile");
        assert_eq!(a.category, Category::HardwareIdentification);
        assert_eq!(a.priority, Priority::High);
    }

    #[test]
    fn prompt_carries_scenario_and_escalation() {
        let prompt = build_system_prompt(&classify("attacco ransomware"));
        assert!(prompt.contains("PRIORITÀ: IMMEDIATE"));
        assert!(prompt.contains("ESCALATION IMMEDIATA"));

        let calm = build_system_prompt(&classify("buongiorno"));
        assert!(calm.contains("SCENARIO CORRENTE: GENERAL_ANALYSIS"));
        assert!(!calm.contains("ESCALATION IMMEDIATA"));
    }
}
