//! Lead qualification scoring.
//!
//! A lead earns points for being close to the Vimercate office, for
//! company size, declared budget, high-margin services and urgency. The
//! total is capped at 100.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::models::ContactSubmission;

/// Free-text signals a score is computed from. Each field is matched
/// case-insensitively by substring.
#[derive(Debug, Clone, Default)]
pub struct LeadSignals {
    pub location: String,
    pub headcount: String,
    pub budget: String,
    pub service: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quality {
    pub label: &'static str,
    pub emoji: &'static str,
    pub color: &'static str,
}

fn has(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn location_points(text: &str) -> u32 {
    if has(text, &["vimercate", "agrate", "concorezzo"]) {
        35
    } else if has(text, &["monza", "brianza", "arcore"]) {
        25
    } else if has(text, &["milano est", "bergamo"]) {
        15
    } else if text.contains("milano") {
        8
    } else {
        0
    }
}

fn headcount_points(text: &str) -> u32 {
    if has(text, &["50+", "100"]) {
        30
    } else if has(text, &["20-50", "25-50"]) {
        25
    } else if has(text, &["10-25", "15-"]) {
        20
    } else if has(text, &["5-15", "5-10"]) {
        15
    } else if text.contains("1-5") {
        5
    } else {
        0
    }
}

fn budget_points(text: &str) -> u32 {
    if has(text, &["30.000", "30000"]) {
        25
    } else if has(text, &["15.000", "15000"]) {
        20
    } else if has(text, &["5.000", "5000"]) {
        15
    } else if text.contains("valutare") {
        10
    } else {
        0
    }
}

fn service_points(text: &str) -> u32 {
    if has(text, &["sicurezza", "firewall", "cybersecurity"]) {
        20
    } else if has(text, &["server", "cloud", "backup"]) {
        18
    } else if has(text, &["assistenza", "contratto"]) {
        15
    } else {
        0
    }
}

fn urgency_points(text: &str) -> u32 {
    if has(text, &["urgent", "immediat", "subito"]) {
        30
    } else if text.contains("settimana") {
        20
    } else if text.contains("mese") {
        10
    } else {
        0
    }
}

pub fn score(signals: &LeadSignals) -> u8 {
    let total = location_points(&signals.location.to_lowercase())
        + headcount_points(&signals.headcount.to_lowercase())
        + budget_points(&signals.budget.to_lowercase())
        + service_points(&signals.service.to_lowercase())
        + urgency_points(&signals.urgency.to_lowercase());
    total.min(100) as u8
}

pub fn quality(score: u8) -> Quality {
    match score {
        80.. => Quality {
            label: "PREMIUM",
            emoji: "🔥",
            color: "FF0000",
        },
        60..=79 => Quality {
            label: "ALTA",
            emoji: "⭐",
            color: "FF6600",
        },
        35..=59 => Quality {
            label: "MEDIA",
            emoji: "✅",
            color: "0078D4",
        },
        _ => Quality {
            label: "BASSA",
            emoji: "📝",
            color: "00BCF2",
        },
    }
}

static HEADCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,5})\s*(?:dipendenti|postazioni|pc|utenti|persone|collaboratori)")
        .expect("Invalid headcount regex")
});

/// Maps a stated headcount onto the bucket labels the scoring tables use.
fn headcount_bucket(n: u32) -> &'static str {
    match n {
        0 => "",
        1..=4 => "1-5",
        5..=14 => "5-15",
        15..=24 => "10-25",
        25..=49 => "20-50",
        _ => "50+",
    }
}

/// Derives signals from conversation text.
///
/// The headcount is only taken from an explicit "N dipendenti" style
/// phrase so that unrelated numbers (prices, phone numbers) do not count.
pub fn signals_from_text(text: &str) -> LeadSignals {
    let lower = text.to_lowercase();
    let headcount = HEADCOUNT_RE
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(headcount_bucket)
        .unwrap_or_default()
        .to_string();

    LeadSignals {
        location: lower.clone(),
        headcount,
        budget: lower.clone(),
        service: lower.clone(),
        urgency: lower,
    }
}

pub fn signals_from_contact(sub: &ContactSubmission) -> LeadSignals {
    let mut service = sub.servizi.join(" ");
    if !sub.form_type.is_empty() {
        service.push(' ');
        service.push_str(&sub.form_type);
    }
    LeadSignals {
        location: sub.comune.clone(),
        headcount: sub.dipendenti.clone(),
        budget: String::new(),
        service,
        urgency: sub.urgenza.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signals_score_zero() {
        assert_eq!(score(&LeadSignals::default()), 0);
        assert_eq!(quality(0).label, "BASSA");
    }

    #[test]
    fn score_is_capped() {
        let s = LeadSignals {
            location: "Vimercate".into(),
            headcount: "50+".into(),
            budget: "oltre 30.000".into(),
            service: "Firewall".into(),
            urgency: "Urgente".into(),
        };
        assert_eq!(score(&s), 100);
        assert_eq!(quality(score(&s)).label, "PREMIUM");
    }

    #[test]
    fn closer_offices_score_higher() {
        let near = LeadSignals {
            location: "Agrate Brianza".into(),
            ..Default::default()
        };
        let far = LeadSignals {
            location: "Milano".into(),
            ..Default::default()
        };
        assert_eq!(score(&near), 35);
        assert_eq!(score(&far), 8);
    }

    #[test]
    fn quality_bands() {
        assert_eq!(quality(80).label, "PREMIUM");
        assert_eq!(quality(79).label, "ALTA");
        assert_eq!(quality(60).label, "ALTA");
        assert_eq!(quality(35).label, "MEDIA");
        assert_eq!(quality(34).label, "BASSA");
    }

    #[test]
    fn text_signals_pick_up_headcount_phrase() {
        let s = signals_from_text("Siamo a Monza, 30 dipendenti, ci serve un backup subito");
        assert_eq!(s.headcount, "20-50");
        // monza 25 + 20-50 25 + backup 18 + subito 30
        assert_eq!(score(&s), 98);
    }

    #[test]
    fn prices_are_not_headcount() {
        let s = signals_from_text("budget di 100 euro");
        assert_eq!(s.headcount, "");
    }
}
