//! # Notification Seam
//!
//! The [`Mailer`] trait is all the core knows about e-mail; the concrete
//! backend (a logger in development, SES or similar in production) is the
//! server's business. This module also owns the two message templates —
//! alert and resolution — with plain `{{placeholder}}` substitution and an
//! on-disk override the `loadtemplates` control word re-reads at runtime.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// Sends one rendered message to a list of addresses.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()>;
}

/// Captures messages instead of sending them. The watchdog test suites
/// assert on what landed here.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMail>>,
}

/// One captured message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        self.sent.lock().push(SentMail {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

const ALERT_SUBJECT: &str = "[{{severity}}] Blockchain network issue {{issue_id}}";

const ALERT_BODY: &str = "\
This is a warning from the network watchdog at {{host_ip}}.

Issue:    {{issue_id}}
Severity: {{severity}}

Nodes not responding: {{unreachable}}
Nodes not advancing:  {{stuck}}

A resolution notice follows when the network recovers.
";

const RESOLUTION_SUBJECT: &str = "[RESOLVED] Blockchain network issue {{issue_id}}";

const RESOLUTION_BODY: &str = "\
All clear from the network watchdog at {{host_ip}}.

Issue {{issue_id}} is resolved: blocks are advancing again and every node
is answering.
";

/// Field values for an alert rendering.
#[derive(Debug, Clone)]
pub struct AlertFields {
    pub issue_id: String,
    pub severity: String,
    pub host_ip: String,
    pub unreachable: Vec<String>,
    pub stuck: Vec<String>,
}

/// The template pair, bound at startup and replaceable at runtime.
#[derive(Debug, Clone)]
pub struct MailTemplates {
    alert: String,
    resolution: String,
}

impl MailTemplates {
    /// The built-in pair.
    pub fn builtin() -> Self {
        Self {
            alert: ALERT_BODY.to_string(),
            resolution: RESOLUTION_BODY.to_string(),
        }
    }

    /// Loads `alert.txt` / `resolution.txt` from `dir`; each falls back to
    /// its built-in when the file is absent or unreadable.
    pub fn load_from(dir: &Path) -> Self {
        let read = |file: &str, fallback: &str| -> String {
            match std::fs::read_to_string(dir.join(file)) {
                Ok(text) => {
                    tracing::info!(template = file, "loaded mail template");
                    text
                }
                Err(_) => fallback.to_string(),
            }
        };
        Self {
            alert: read("alert.txt", ALERT_BODY),
            resolution: read("resolution.txt", RESOLUTION_BODY),
        }
    }

    /// Renders the alert message. Returns `(subject, body)`.
    pub fn render_alert(&self, fields: &AlertFields) -> (String, String) {
        let subject = ALERT_SUBJECT
            .replace("{{severity}}", &fields.severity)
            .replace("{{issue_id}}", &fields.issue_id);
        let body = self
            .alert
            .replace("{{issue_id}}", &fields.issue_id)
            .replace("{{severity}}", &fields.severity)
            .replace("{{host_ip}}", &fields.host_ip)
            .replace("{{unreachable}}", &name_list(&fields.unreachable))
            .replace("{{stuck}}", &name_list(&fields.stuck));
        (subject, body)
    }

    /// Renders the resolution message. Returns `(subject, body)`.
    pub fn render_resolution(&self, issue_id: &str, host_ip: &str) -> (String, String) {
        let subject = RESOLUTION_SUBJECT.replace("{{issue_id}}", issue_id);
        let body = self
            .resolution
            .replace("{{issue_id}}", issue_id)
            .replace("{{host_ip}}", host_ip);
        (subject, body)
    }
}

fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AlertFields {
        AlertFields {
            issue_id: "BCN-20260801120000123".into(),
            severity: "AMBER".into(),
            host_ip: "192.168.1.10".into(),
            unreachable: vec!["miner3".into()],
            stuck: vec![],
        }
    }

    #[test]
    fn alert_substitutes_every_field() {
        let (subject, body) = MailTemplates::builtin().render_alert(&fields());
        assert_eq!(subject, "[AMBER] Blockchain network issue BCN-20260801120000123");
        assert!(body.contains("192.168.1.10"));
        assert!(body.contains("Nodes not responding: miner3"));
        assert!(body.contains("Nodes not advancing:  none"));
        assert!(!body.contains("{{"), "unsubstituted placeholder left: {body}");
    }

    #[test]
    fn resolution_carries_the_issue_id() {
        let (subject, body) =
            MailTemplates::builtin().render_resolution("BCN-1", "192.168.1.10");
        assert!(subject.contains("BCN-1"));
        assert!(subject.contains("RESOLVED"));
        assert!(body.contains("BCN-1"));
        assert!(!body.contains("{{"));
    }

    #[test]
    fn disk_templates_override_builtin() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("alert.txt"), "custom {{issue_id}}").unwrap();

        let templates = MailTemplates::load_from(dir.path());
        let (_, body) = templates.render_alert(&fields());
        assert_eq!(body, "custom BCN-20260801120000123");

        // resolution.txt was absent; the builtin still renders.
        let (_, body) = templates.render_resolution("BCN-2", "10.0.0.1");
        assert!(body.contains("All clear"));
    }

    #[tokio::test]
    async fn memory_mailer_captures_messages() {
        let mailer = MemoryMailer::new();
        mailer
            .send(&["ops@example.com".into()], "subject", "body")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["ops@example.com".to_string()]);
    }
}
