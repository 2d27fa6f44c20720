//! Email bodies rendered with minijinja.
//!
//! `.html` templates are auto-escaped, so form input can be interpolated
//! as-is. The plain-text variant is not escaped.

use minijinja::Environment;
use serde::Serialize;

use crate::models::ContactSubmission;

/// Values every contact email template can reference.
#[derive(Debug, Clone, Serialize)]
pub struct ContactEmailContext<'a> {
    pub ticket_id: &'a str,
    pub contact: &'a ContactSubmission,
    pub lead_score: u8,
    pub lead_quality: &'static str,
    /// Human-readable submission time, Europe/Rome style `dd/mm/yyyy HH:MM`.
    pub submitted_at: String,
    pub urgent: bool,
}

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("notification.html", NOTIFICATION_HTML)?;
        env.add_template("notification.txt", NOTIFICATION_TXT)?;
        env.add_template("confirmation.html", CONFIRMATION_HTML)?;
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }

    pub fn notification_html(&self, ctx: &ContactEmailContext) -> Result<String, minijinja::Error> {
        self.render("notification.html", ctx)
    }

    pub fn notification_text(&self, ctx: &ContactEmailContext) -> Result<String, minijinja::Error> {
        self.render("notification.txt", ctx)
    }

    pub fn confirmation_html(&self, ctx: &ContactEmailContext) -> Result<String, minijinja::Error> {
        self.render("confirmation.html", ctx)
    }
}

const NOTIFICATION_HTML: &str = r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="margin:0;padding:0;font-family:'Segoe UI',Arial,sans-serif;background-color:#f4f4f4;">
  <div style="max-width:600px;margin:0 auto;background-color:#ffffff;">
    <div style="background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);padding:30px;text-align:center;">
      <h1 style="color:white;margin:0;font-size:28px;">IT-ERA</h1>
      <p style="color:rgba(255,255,255,0.9);margin:10px 0 0 0;font-size:14px;">Nuova richiesta dal sito web &middot; {{ ticket_id }}</p>
    </div>
    <div style="padding:30px;">
      <h2 style="color:#333;font-size:20px;margin-bottom:20px;">Dettagli Richiesta</h2>
      <table style="width:100%;border-collapse:collapse;">
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;width:35%;"><strong>Nome:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;color:#333;">{{ contact.nome }}</td></tr>
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Email:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;"><a href="mailto:{{ contact.email }}" style="color:#667eea;">{{ contact.email }}</a></td></tr>
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Telefono:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;"><a href="tel:{{ contact.telefono }}" style="color:#667eea;">{{ contact.telefono }}</a></td></tr>
        {% if contact.azienda %}
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Azienda:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;color:#333;">{{ contact.azienda }}</td></tr>
        {% endif %}
        {% if contact.comune %}
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Comune:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;color:#333;">{{ contact.comune }}</td></tr>
        {% endif %}
        {% if contact.dipendenti %}
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Dipendenti:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;color:#333;">{{ contact.dipendenti }}</td></tr>
        {% endif %}
        {% if contact.servizi %}
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Servizi:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;color:#333;">{{ contact.servizi | join(", ") }}</td></tr>
        {% endif %}
        {% if contact.urgenza %}
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Urgenza:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;">
              <span style="display:inline-block;padding:4px 12px;border-radius:20px;font-size:12px;color:white;background-color:{% if urgent %}#ff4444{% else %}#4CAF50{% endif %};">{{ contact.urgenza | upper }}</span>
            </td></tr>
        {% endif %}
        <tr><td style="padding:12px;border-bottom:1px solid #eee;color:#666;"><strong>Lead score:</strong></td>
            <td style="padding:12px;border-bottom:1px solid #eee;color:#333;">{{ lead_score }}/100 ({{ lead_quality }})</td></tr>
        {% if contact.messaggio %}
        <tr><td style="padding:12px;color:#666;vertical-align:top;"><strong>Messaggio:</strong></td>
            <td style="padding:12px;color:#333;"><div style="background-color:#f8f9fa;padding:15px;border-radius:8px;white-space:pre-wrap;">{{ contact.messaggio }}</div></td></tr>
        {% endif %}
      </table>
      <div style="margin-top:30px;padding:20px;background-color:#f8f9fa;border-radius:8px;text-align:center;">
        <p style="margin:0 0 15px 0;color:#666;font-size:14px;">Rispondi direttamente a questa email o contatta il cliente:</p>
        <a href="mailto:{{ contact.email }}" style="display:inline-block;padding:12px 30px;background-color:#667eea;color:white;text-decoration:none;border-radius:25px;font-weight:600;">Rispondi al Cliente</a>
      </div>
    </div>
    <div style="background-color:#f8f9fa;padding:20px;text-align:center;border-top:1px solid #eee;">
      <p style="color:#999;font-size:12px;margin:0;">IT-ERA - Servizi IT Professionali<br>Viale Risorgimento 32, Vimercate (MB)<br>Tel: 039 888 2041 | P.IVA: 10524040966</p>
      <p style="color:#999;font-size:11px;margin:10px 0 0 0;">Ricevuta il {{ submitted_at }} dal modulo del sito web IT-ERA</p>
    </div>
  </div>
</body>
</html>
"##;

const NOTIFICATION_TXT: &str = r#"Nuova richiesta dal sito IT-ERA ({{ ticket_id }})

DETTAGLI RICHIESTA
------------------
Nome: {{ contact.nome }}
Email: {{ contact.email }}
Telefono: {{ contact.telefono }}
{% if contact.azienda %}
Azienda: {{ contact.azienda }}
{% endif %}
{% if contact.comune %}
Comune: {{ contact.comune }}
{% endif %}
{% if contact.dipendenti %}
Dipendenti: {{ contact.dipendenti }}
{% endif %}
{% if contact.servizi %}
Servizi: {{ contact.servizi | join(", ") }}
{% endif %}
{% if contact.urgenza %}
Urgenza: {{ contact.urgenza }}
{% endif %}
Lead score: {{ lead_score }}/100 ({{ lead_quality }})
{% if contact.messaggio %}

Messaggio:
{{ contact.messaggio }}
{% endif %}

--
IT-ERA - Servizi IT Professionali
Viale Risorgimento 32, Vimercate (MB)
Tel: 039 888 2041 | P.IVA: 10524040966
"#;

const CONFIRMATION_HTML: &str = r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <title>Conferma Richiesta - IT-ERA</title>
</head>
<body style="margin:0;padding:0;font-family:Arial,sans-serif;background-color:#f4f4f4;">
  <div style="max-width:600px;margin:0 auto;background-color:white;">
    <div style="background:linear-gradient(135deg,#0056cc 0%,#00b336 100%);color:white;padding:30px;text-align:center;">
      <h1 style="margin:0;font-size:28px;">IT-ERA</h1>
      <p style="margin:10px 0 0 0;font-size:16px;opacity:0.9;">Soluzioni IT Professionali</p>
    </div>
    <div style="padding:40px 30px;">
      <h2 style="color:#0056cc;margin:0 0 20px 0;">Ciao {{ contact.nome }}!</h2>
      <p style="font-size:16px;line-height:1.6;color:#333;">Abbiamo ricevuto la tua richiesta e siamo già al lavoro per aiutarti.</p>
      <div style="background-color:#f8f9fa;border-left:4px solid #0056cc;padding:20px;margin:20px 0;border-radius:5px;">
        <p style="margin:5px 0;font-size:14px;"><strong>Ticket ID:</strong> {{ ticket_id }}</p>
        {% if contact.servizi %}
        <p style="margin:5px 0;font-size:14px;"><strong>Servizi:</strong> {{ contact.servizi | join(", ") }}</p>
        {% endif %}
        <p style="margin:5px 0;font-size:14px;"><strong>Data:</strong> {{ submitted_at }}</p>
      </div>
      <ul style="padding-left:20px;line-height:1.8;color:#333;">
        <li>Un nostro tecnico analizzerà la tua richiesta</li>
        <li>Ti contatteremo entro 4 ore lavorative</li>
        <li>Riceverai un preventivo personalizzato</li>
      </ul>
      <div style="background-color:#fff3cd;border:1px solid #ffeaa7;padding:20px;margin:30px 0;border-radius:8px;text-align:center;">
        <p style="color:#856404;margin:0 0 15px 0;font-size:14px;">Hai un'emergenza? Chiamaci ora:</p>
        <a href="tel:+390398882041" style="display:inline-block;background-color:#dc3545;color:white;padding:12px 25px;text-decoration:none;border-radius:25px;font-weight:bold;">039 888 2041</a>
      </div>
    </div>
    <div style="background-color:#f8f9fa;padding:30px;text-align:center;border-top:1px solid #e9ecef;">
      <p style="margin:0;color:#6c757d;font-size:12px;">IT-ERA | Viale Risorgimento 32, Vimercate MB | P.IVA: 10524040966</p>
    </div>
  </div>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> ContactSubmission {
        ContactSubmission {
            nome: "Anna & Co".into(),
            email: "anna@example.it".into(),
            telefono: "039 888 2041".into(),
            azienda: String::new(),
            comune: "Vimercate".into(),
            dipendenti: String::new(),
            servizi: vec!["Backup".into(), "Firewall".into()],
            urgenza: "urgente".into(),
            messaggio: "Server \"lento\"".into(),
            form_type: "preventivo".into(),
        }
    }

    fn ctx(sub: &ContactSubmission) -> ContactEmailContext<'_> {
        ContactEmailContext {
            ticket_id: "ITERA-1",
            contact: sub,
            lead_score: 65,
            lead_quality: "ALTA",
            submitted_at: "01/01/2026 10:00".into(),
            urgent: true,
        }
    }

    #[test]
    fn html_is_escaped_and_optional_rows_skipped() {
        let t = Templates::new().unwrap();
        let sub = submission();
        let html = t.notification_html(&ctx(&sub)).unwrap();
        assert!(html.contains("Anna &amp; Co"));
        assert!(!html.contains("Azienda:"));
        assert!(html.contains("Backup, Firewall"));
        assert!(html.contains("URGENTE"));
        assert!(html.contains("#ff4444"));
    }

    #[test]
    fn text_is_not_escaped() {
        let t = Templates::new().unwrap();
        let sub = submission();
        let text = t.notification_text(&ctx(&sub)).unwrap();
        assert!(text.contains("Nome: Anna & Co"));
        assert!(text.contains("Server \"lento\""));
        assert!(text.contains("Lead score: 65/100 (ALTA)"));
    }

    #[test]
    fn confirmation_carries_ticket() {
        let t = Templates::new().unwrap();
        let sub = submission();
        let html = t.confirmation_html(&ctx(&sub)).unwrap();
        assert!(html.contains("ITERA-1"));
        assert!(html.contains("Ciao Anna &amp; Co!"));
    }
}
