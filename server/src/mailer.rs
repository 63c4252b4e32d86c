//! # Log Mail Backend
//!
//! The development/default [`Mailer`]: notifications land in the log
//! instead of an inbox. Swapping in a real backend (SES and friends) means
//! implementing the same trait and changing one line of wiring in `main`.

use async_trait::async_trait;
use prometheus::IntCounter;

use chainwatch::mailer::Mailer;
use chainwatch::Result;

use crate::metrics::ServerMetrics;

/// Writes every notification to the log at INFO.
pub struct LogMailer {
    notifications: IntCounter,
}

impl LogMailer {
    pub fn new(metrics: &ServerMetrics) -> Self {
        Self {
            notifications: metrics.notifications_total.clone(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        self.notifications.inc();
        tracing::info!(
            recipients = %recipients.join(", "),
            subject,
            "notification (log backend)"
        );
        for line in body.lines() {
            tracing::info!("    {line}");
        }
        Ok(())
    }
}
