//! Contact form validation and input sanitising.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ContactRequest, ContactSubmission};

/// Maximum number of characters kept from any free-text field.
pub const MAX_FIELD_CHARS: usize = 1000;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

// Italian numbers, optionally prefixed by +39.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+39)?\s?[0-9]{3,4}\s?[0-9]{6,7}$").expect("Invalid phone regex")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE_RE.is_match(&compact)
}

/// Strips angle brackets, trims and caps the length at [`MAX_FIELD_CHARS`].
pub fn sanitize_input(input: &str) -> String {
    let stripped: String = input.chars().filter(|c| *c != '<' && *c != '>').collect();
    stripped.trim().chars().take(MAX_FIELD_CHARS).collect()
}

fn sanitize_opt(input: &Option<String>) -> String {
    input.as_deref().map(sanitize_input).unwrap_or_default()
}

/// Returns the user-facing error messages for a contact request.
///
/// Name and email are checked in their sanitised form, the form that gets
/// stored and emailed. An empty vector means the request is acceptable.
pub fn validate_contact(req: &ContactRequest) -> Vec<String> {
    let mut errors = Vec::new();

    if sanitize_opt(&req.nome).chars().count() < 2 {
        errors.push("Nome richiesto (minimo 2 caratteri)".to_string());
    }

    if !is_valid_email(&sanitize_opt(&req.email)) {
        errors.push("Email valida richiesta".to_string());
    }

    match req.telefono.as_deref() {
        Some(phone) if is_valid_phone(phone) => {}
        _ => errors.push("Numero di telefono valido richiesto".to_string()),
    }

    if !req.privacy {
        errors.push("Accettazione privacy richiesta".to_string());
    }

    errors
}

/// Produces the sanitised submission. Call only after [`validate_contact`]
/// returned no errors.
pub fn sanitize_contact(req: &ContactRequest) -> ContactSubmission {
    ContactSubmission {
        nome: sanitize_opt(&req.nome),
        email: sanitize_opt(&req.email),
        telefono: sanitize_opt(&req.telefono),
        azienda: sanitize_opt(&req.azienda),
        comune: sanitize_opt(&req.comune),
        dipendenti: sanitize_opt(&req.dipendenti),
        servizi: req
            .servizi
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|s| sanitize_input(s))
            .filter(|s| !s.is_empty())
            .collect(),
        urgenza: sanitize_opt(&req.urgenza),
        messaggio: sanitize_opt(&req.messaggio),
        form_type: sanitize_opt(&req.form_type),
    }
}
