//! Canned replies used when no language model is configured or the model
//! call fails.

use crate::intent::{default_options, Intent};

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub options: Vec<String>,
    pub escalate: bool,
}

fn reply(message: &str, options: &[&str], escalate: bool) -> Reply {
    Reply {
        message: message.to_string(),
        options: options.iter().map(|s| s.to_string()).collect(),
        escalate,
    }
}

pub fn greeting() -> Reply {
    reply(
        "👋 **Ciao! Sono l'assistente virtuale IT-ERA**

IT-ERA offre servizi IT per le aziende della Brianza, con sede a Vimercate (MB) e oltre 10 anni di esperienza.

**Come posso aiutarti oggi?**",
        &[
            "🔒 Sicurezza informatica",
            "🛠️ Assistenza IT",
            "💾 Backup e recovery",
            "🔧 Riparazione hardware",
            "💰 Preventivo gratuito",
            "📞 Contatti",
        ],
        false,
    )
}

pub fn for_intent(intent: Intent) -> Reply {
    match intent {
        Intent::Preventivo => reply(
            "💰 **Preventivo personalizzato GRATUITO**

Per prepararti un preventivo preciso ci servono:
• il servizio che ti interessa
• quante postazioni/PC avete
• la zona in cui vi trovate

📞 **Telefono:** 039 888 2041
📧 **Email:** info@it-era.it

✅ Sopralluogo sempre gratuito e senza impegno.
*Ti ricontatteremo entro 24 ore.*",
            &[
                "📞 Chiamate subito",
                "📧 Inviate email",
                "🏢 Sopralluogo gratuito",
                "🔒 Preventivo sicurezza",
                "🛠️ Preventivo assistenza",
            ],
            true,
        ),
        Intent::Emergenza => reply(
            "🚨 **EMERGENZA IT - Intervento immediato**

**📞 CHIAMA SUBITO: 039 888 2041**

Interveniamo rapidamente per:
• server down o sistemi bloccati
• attacchi malware/ransomware
• perdita di dati critici
• problemi della rete aziendale

⏱️ Zona Vimercate/Monza: 2-4 ore. Clienti con contratto: priorità assoluta.",
            &[
                "📞 Chiama ora: 039 888 2041",
                "💥 Server down",
                "🦠 Attacco malware",
                "💾 Perdita dati",
                "🌐 Rete non funziona",
            ],
            true,
        ),
        Intent::HumanRequest => reply(
            "🙋 **Ti metto in contatto con un nostro consulente**

📞 **Chiama direttamente: 039 888 2041**
📧 Oppure scrivi a info@it-era.it

Lun-Ven 8:30-18:00. Preferisci essere ricontattato via telefono o email?",
            &[
                "📞 Chiama ora: 039 888 2041",
                "📧 Ricontattatemi via email",
                "📱 Ricontattatemi al telefono",
            ],
            true,
        ),
        Intent::Sicurezza => reply(
            "🔒 **Sicurezza informatica**

🛡️ Partner WatchGuard certificato: firewall next-generation, VPN aziendali, web filtering, monitoraggio.
🦠 Antivirus enterprise con gestione centralizzata.
🔍 Security assessment e audit delle vulnerabilità.

Per un preventivo preciso prenota un **sopralluogo gratuito**.",
            &[
                "🛡️ Firewall WatchGuard",
                "🦠 Antivirus aziendale",
                "🔍 Audit sicurezza",
                "💰 Preventivo gratuito",
            ],
            false,
        ),
        Intent::Supporto => reply(
            "🛠️ **Assistenza IT professionale**

💻 Assistenza remota per problemi software, Lun-Ven 8:30-18:00.
🏢 Interventi on-site in Brianza, anche in giornata.
📋 Contratti di manutenzione con priorità negli interventi.

La **prima consulenza è sempre gratuita**.",
            &[
                "💻 Assistenza remota",
                "🏢 Intervento in sede",
                "📋 Contratto manutenzione",
                "💰 Consulenza gratuita",
            ],
            false,
        ),
        Intent::Backup => reply(
            "💾 **Backup e disaster recovery**

☁️ Backup cloud automatizzato e cifrato, con test di ripristino periodici.
🔄 Piani di continuità operativa con RTO/RPO definiti.
📊 Assessment dei dati critici gratuito.

*Non rischiare di perdere anni di lavoro.*",
            &[
                "☁️ Backup cloud",
                "🔄 Disaster recovery",
                "📊 Assessment gratuito",
                "💰 Preventivo backup",
            ],
            false,
        ),
        Intent::Riparazione => reply(
            "🔧 **Riparazione hardware certificata**

💻 PC desktop e laptop di tutte le marche, diagnosi gratuita.
🍎 Assistenza Mac e recupero dati.
🖥️ Server rack/tower e storage NAS.

Vimercate/Monza: 2-4 ore. Brianza: in giornata.",
            &[
                "💻 Riparazione PC",
                "🍎 Assistenza Mac",
                "🖥️ Server hardware",
                "🔍 Diagnosi gratuita",
            ],
            false,
        ),
        Intent::Contatti => reply(
            "📞 **Contatti IT-ERA**

🏢 Viale Risorgimento 32, 20871 Vimercate (MB)
📞 039 888 2041
📧 info@it-era.it

⏰ Lun-Ven 8:30-18:00, reperibilità per emergenze dei clienti.",
            &[
                "📞 Chiama: 039 888 2041",
                "📧 Email: info@it-era.it",
                "🗺️ Come raggiungerci",
                "💰 Preventivo gratuito",
            ],
            false,
        ),
        Intent::Generale => Reply {
            options: default_options(Intent::Generale),
            ..greeting()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sales_and_emergency_replies_escalate() {
        assert!(for_intent(Intent::Preventivo).escalate);
        assert!(for_intent(Intent::Emergenza).escalate);
        assert!(for_intent(Intent::HumanRequest).escalate);
        assert!(!for_intent(Intent::Backup).escalate);
        assert!(!greeting().escalate);
    }

    #[test]
    fn emergency_reply_carries_phone() {
        let r = for_intent(Intent::Emergenza);
        assert!(r.message.contains("039 888 2041"));
        assert!(r.options[0].contains("039 888 2041"));
    }
}
