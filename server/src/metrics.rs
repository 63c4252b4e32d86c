//! # Prometheus Metrics
//!
//! Operational metrics for the server, scraped at `GET /metrics`. Counters
//! are bumped where things happen; the model gauges are refreshed from the
//! shared state at scrape time, so a scrape is always a consistent
//! snapshot rather than a trail of increments.

use std::sync::Arc;

use chainwatch::monitor::NetworkMonitor;
use chainwatch::watchdog::{Phase, Severity};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Holds all Prometheus metric handles for the server.
///
/// Clone-friendly (prometheus handles are internally shared) so it can be
/// handed to request handlers and the mailer.
#[derive(Clone)]
pub struct ServerMetrics {
    registry: Registry,
    /// Requests dispatched through the command surface.
    pub http_requests_total: IntCounter,
    /// Commands that ended in a rendered error line.
    pub command_errors_total: IntCounter,
    /// Notifications handed to the mail backend.
    pub notifications_total: IntCounter,
    /// Nodes currently in the model.
    pub known_nodes: IntGauge,
    /// Addresses currently in the unreachable set.
    pub unreachable_addresses: IntGauge,
    /// Addresses currently blocked.
    pub blocked_addresses: IntGauge,
    /// Watchdog phase (0=RESET, 1=OK, 2=DETECTED, 3=NOTIFIED).
    pub watchdog_phase: IntGauge,
    /// Watchdog severity (0=none, 1=AMBER, 2=RED).
    pub watchdog_severity: IntGauge,
}

impl ServerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("chainwatch".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        }
        fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
            let g = IntGauge::new(name, help).expect("metric creation");
            registry.register(Box::new(g.clone())).expect("metric registration");
            g
        }

        Self {
            http_requests_total: counter(
                &registry,
                "http_requests_total",
                "Requests dispatched through the command surface",
            ),
            command_errors_total: counter(
                &registry,
                "command_errors_total",
                "Commands that ended in a rendered error line",
            ),
            notifications_total: counter(
                &registry,
                "notifications_total",
                "Notifications handed to the mail backend",
            ),
            known_nodes: gauge(&registry, "known_nodes", "Nodes currently in the model"),
            unreachable_addresses: gauge(
                &registry,
                "unreachable_addresses",
                "Addresses currently marked unreachable",
            ),
            blocked_addresses: gauge(
                &registry,
                "blocked_addresses",
                "Addresses currently blocked from dialing",
            ),
            watchdog_phase: gauge(
                &registry,
                "watchdog_phase",
                "Watchdog phase (0=RESET, 1=OK, 2=DETECTED, 3=NOTIFIED)",
            ),
            watchdog_severity: gauge(
                &registry,
                "watchdog_severity",
                "Watchdog severity (0=none, 1=AMBER, 2=RED)",
            ),
            registry,
        }
    }

    /// Refreshes the model gauges from the shared state.
    pub fn refresh_from(&self, monitor: &Arc<NetworkMonitor>) {
        let state = monitor.state().lock();
        self.known_nodes.set(state.model.nodes.len() as i64);
        self.unreachable_addresses
            .set(state.model.unreachable_addresses.len() as i64);
        self.blocked_addresses
            .set(state.model.blocked_addresses.len() as i64);
        self.watchdog_phase.set(match state.watchdog.phase {
            Phase::Reset => 0,
            Phase::Ok => 1,
            Phase::Detected => 2,
            Phase::Notified => 3,
        });
        self.watchdog_severity.set(match state.watchdog.severity {
            Severity::None => 0,
            Severity::Amber => 1,
            Severity::Red => 2,
        });
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
