//! # Network Watchdog
//!
//! The background flow: a ticker-driven probe loop that rescans the model,
//! reduces it to `(progressing, unreachable, stuck)`, runs the incident
//! state machine, and dispatches notifications on transitions. The probe
//! interval and the recipient list survive restarts as one JSON document,
//! rewritten on shutdown.
//!
//! Ticks are skip-if-busy: the loop `try_lock`s the monitor's operation
//! gate, and a tick that finds a discovery or a foreground command still
//! running is dropped, never queued. The probe interval is therefore a
//! lower bound, not a schedule.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_PROBE_INTERVAL, WATCHDOG_CONFIG_FILE};
use crate::mailer::{AlertFields, MailTemplates, Mailer};
use crate::monitor::{NetworkMonitor, ProbeSummary};
use crate::transport::{Clock, ConfigStore};

pub mod state;

pub use state::{Notification, Phase, Severity, WatchdogState};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// The persisted part of the watchdog: who gets mail (with an active
/// flag, so an address can be muted without losing it) and how often to
/// probe. Serialized with the field names and nanosecond interval the
/// config files in the field already use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(rename = "Recipients", default)]
    pub recipients: BTreeMap<String, bool>,
    #[serde(rename = "ProbeInterval", with = "interval_nanos", default = "default_interval")]
    pub probe_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            recipients: BTreeMap::new(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

impl WatchdogConfig {
    /// Recipients whose active flag is on.
    pub fn active_recipients(&self) -> Vec<String> {
        self.recipients
            .iter()
            .filter(|(_, active)| **active)
            .map(|(address, _)| address.clone())
            .collect()
    }
}

fn default_interval() -> Duration {
    DEFAULT_PROBE_INTERVAL
}

/// `ProbeInterval` on disk is an integer nanosecond count.
mod interval_nanos {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(d)?;
        Ok(Duration::from_nanos(nanos))
    }
}

/// RFC-5322-shaped address check, the same expression the recipient list
/// has always been validated against.
pub fn valid_email(address: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
            )
            .expect("email regex compiles")
        })
        .is_match(address)
}

// ---------------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------------

/// Snapshot rendered by the `watchdogstatus` control word.
#[derive(Debug, Clone, Serialize)]
pub struct WatchdogStatusReport {
    pub phase: Phase,
    pub severity: Severity,
    pub current_issue_id: String,
    pub probe_interval_secs: u64,
    pub progress_threshold_secs: u64,
    pub recipients: BTreeMap<String, bool>,
}

// ---------------------------------------------------------------------------
// The watchdog
// ---------------------------------------------------------------------------

/// The background probe loop plus its control surface. State and config
/// live inside the monitor's shared state, under the same mutex as the
/// model — the control words and the probe loop never race.
pub struct Watchdog {
    monitor: Arc<NetworkMonitor>,
    mailer: Arc<dyn Mailer>,
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    templates: Mutex<MailTemplates>,
    /// Advertised in every notification so the operator knows which
    /// watchdog instance is talking.
    host_ip: String,
}

impl Watchdog {
    /// Builds the watchdog and loads any persisted config into the shared
    /// state. The probe loop starts separately via [`Watchdog::run`].
    pub fn new(
        monitor: Arc<NetworkMonitor>,
        mailer: Arc<dyn Mailer>,
        store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
        host_ip: String,
    ) -> Arc<Self> {
        let watchdog = Self {
            monitor,
            mailer,
            store,
            clock,
            templates: Mutex::new(MailTemplates::builtin()),
            host_ip,
        };
        watchdog.load_config();
        Arc::new(watchdog)
    }

    /// The probe loop. Returns when the shutdown channel fires, after
    /// persisting the config.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval = ?self.interval(), "watchdog started");
        loop {
            let interval = self.interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("watchdog rolling down");
        self.save_config();
    }

    /// One tick. Skip-if-busy: an operation already holding the gate wins
    /// and this tick evaporates.
    async fn tick(&self) {
        let Ok(_gate) = self.monitor.ops.try_lock() else {
            debug!("operation in flight, skipping watchdog tick");
            return;
        };
        debug!("watchdog probe");
        let summary = match self.monitor.heartbeat_locked().await {
            Ok(summary) => summary,
            Err(err) => {
                warn!("watchdog probe failed: {err}");
                return;
            }
        };
        // An empty model means discovery has not run yet; there is no
        // network to have an opinion about.
        if self.monitor.state().lock().model.nodes.is_empty() {
            debug!("no nodes known yet, probe idle");
            return;
        }
        self.process_summary(summary).await;
    }

    /// Runs the state machine on one probe summary and dispatches whatever
    /// notification the transition calls for.
    pub async fn process_summary(&self, summary: ProbeSummary) {
        let (notification, recipients) = {
            let mut shared = self.monitor.state().lock();
            let now = self.clock.now();
            let (next, notification) =
                state::advance(&shared.watchdog, &summary, || mint_issue_id(now));
            shared.watchdog = next;
            (notification, shared.watchdog_config.active_recipients())
        };

        let Some(notification) = notification else {
            return;
        };

        let (unreachable, stuck) = self.monitor.trouble_names();
        let (subject, body) = {
            let templates = self.templates.lock();
            match &notification {
                Notification::Escalate { issue_id, severity } => {
                    info!(issue = %issue_id, severity = severity.as_str(), "escalating incident");
                    templates.render_alert(&AlertFields {
                        issue_id: issue_id.clone(),
                        severity: severity.as_str().to_string(),
                        host_ip: self.host_ip.clone(),
                        unreachable,
                        stuck,
                    })
                }
                Notification::Resolve { issue_id } => {
                    info!(issue = %issue_id, "resolving incident");
                    templates.render_resolution(issue_id, &self.host_ip)
                }
            }
        };

        if recipients.is_empty() {
            warn!("no active recipients, notification dropped");
            return;
        }
        if let Err(err) = self.mailer.send(&recipients, &subject, &body).await {
            error!("notification dispatch failed: {err}");
        }
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Current probe interval.
    pub fn interval(&self) -> Duration {
        self.monitor.state().lock().watchdog_config.probe_interval
    }

    /// Replaces the probe interval; takes effect at the next tick.
    pub fn set_interval(&self, seconds: u64) {
        let interval = Duration::from_secs(seconds.max(1));
        info!(?interval, "watchdog interval updated");
        self.monitor.state().lock().watchdog_config.probe_interval = interval;
    }

    /// Replaces the sampler's progress threshold.
    pub fn set_threshold(&self, seconds: u64) {
        let threshold = Duration::from_secs(seconds.max(1));
        info!(?threshold, "progress threshold updated");
        self.monitor.state().lock().progress_threshold = threshold;
    }

    /// Manual reset to OK with empty severity. The open issue id is kept —
    /// the incident is silenced, not forgotten.
    pub fn set_status_ok(&self) {
        let mut shared = self.monitor.state().lock();
        shared.watchdog.phase = Phase::Ok;
        shared.watchdog.severity = Severity::None;
        info!("watchdog status manually reset to OK");
    }

    /// Validates and inserts a recipient. Returns whether it was accepted.
    pub fn add_recipient(&self, address: &str) -> bool {
        if !valid_email(address) {
            warn!(%address, "rejecting invalid recipient address");
            return false;
        }
        self.monitor
            .state()
            .lock()
            .watchdog_config
            .recipients
            .insert(address.to_string(), true);
        true
    }

    /// Mutes a recipient, keeping the entry. Returns whether it existed.
    pub fn block_recipient(&self, address: &str) -> bool {
        let mut shared = self.monitor.state().lock();
        match shared.watchdog_config.recipients.get_mut(address) {
            Some(active) => {
                *active = false;
                true
            }
            None => false,
        }
    }

    /// Deletes a recipient. Returns whether it existed.
    pub fn remove_recipient(&self, address: &str) -> bool {
        self.monitor
            .state()
            .lock()
            .watchdog_config
            .recipients
            .remove(address)
            .is_some()
    }

    /// Full status snapshot for the control surface.
    pub fn status(&self) -> WatchdogStatusReport {
        let shared = self.monitor.state().lock();
        WatchdogStatusReport {
            phase: shared.watchdog.phase,
            severity: shared.watchdog.severity,
            current_issue_id: shared.watchdog.current_issue_id.clone(),
            probe_interval_secs: shared.watchdog_config.probe_interval.as_secs(),
            progress_threshold_secs: shared.progress_threshold.as_secs(),
            recipients: shared.watchdog_config.recipients.clone(),
        }
    }

    /// Re-reads the mail templates from `dir`, falling back to the
    /// built-ins per file.
    pub fn reload_templates(&self, dir: &Path) {
        *self.templates.lock() = MailTemplates::load_from(dir);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn load_config(&self) {
        match self.store.load(WATCHDOG_CONFIG_FILE) {
            Ok(Some(bytes)) => match serde_json::from_slice::<WatchdogConfig>(&bytes) {
                Ok(mut config) => {
                    if config.probe_interval.is_zero() {
                        config.probe_interval = DEFAULT_PROBE_INTERVAL;
                    }
                    info!(
                        recipients = config.recipients.len(),
                        interval = ?config.probe_interval,
                        "watchdog config loaded"
                    );
                    self.monitor.state().lock().watchdog_config = config;
                }
                Err(err) => warn!("cannot parse watchdog config: {err}"),
            },
            Ok(None) => debug!("no persisted watchdog config"),
            Err(err) => warn!("cannot read watchdog config: {err}"),
        }
    }

    /// Writes the config. Called on shutdown, and cheap enough to call
    /// from tests directly.
    pub fn save_config(&self) {
        let config = self.monitor.state().lock().watchdog_config.clone();
        match serde_json::to_vec_pretty(&config) {
            Ok(bytes) => {
                if let Err(err) = self.store.save(WATCHDOG_CONFIG_FILE, &bytes) {
                    warn!("cannot persist watchdog config: {err}");
                }
            }
            Err(err) => warn!("cannot serialize watchdog config: {err}"),
        }
    }
}

fn mint_issue_id(now: DateTime<Utc>) -> String {
    format!("BCN-{}", now.format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_with_on_disk_field_names() {
        let mut config = WatchdogConfig::default();
        config.recipients.insert("ops@example.com".into(), true);
        config.recipients.insert("muted@example.com".into(), false);
        config.probe_interval = Duration::from_secs(30);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""Recipients""#));
        assert!(json.contains(r#""ProbeInterval":30000000000"#));

        let back: WatchdogConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.probe_interval, Duration::from_secs(30));
        assert_eq!(back.active_recipients(), vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn config_tolerates_missing_fields() {
        let config: WatchdogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.probe_interval, DEFAULT_PROBE_INTERVAL);
        assert!(config.recipients.is_empty());
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("ops@example.com"));
        assert!(valid_email("first.last+tag@sub.example.co"));
        assert!(!valid_email("not-an-address"));
        assert!(!valid_email("missing@tld@twice"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@"));
    }

    #[test]
    fn issue_ids_are_timestamp_derived() {
        let now = chrono::TimeZone::timestamp_opt(&Utc, 1_764_547_200, 0).unwrap();
        let id = mint_issue_id(now);
        assert!(id.starts_with("BCN-2025"), "unexpected id: {id}");
    }
}
