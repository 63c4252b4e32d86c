//! # Incident State Machine
//!
//! Pure transition logic: given the stored state and one probe summary,
//! compute the next state and whether to notify. Keeping this free of I/O
//! is what lets the test suite drive every probe sequence an unlucky
//! operator could ever live through.
//!
//! The rules, in order of precedence:
//!
//! - nothing progressing anywhere → RED (network-wide stall);
//! - progressing, but some node unreachable or stuck → AMBER;
//! - a fresh incident escalates once, with a newly minted issue id;
//! - an AMBER→RED upgrade escalates again under the same issue id;
//! - severity downgrades without reaching OK stay silent;
//! - reaching OK resolves the incident, exactly once.

use serde::Serialize;

use crate::monitor::ProbeSummary;

/// The watchdog's main state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "DETECTED")]
    Detected,
    #[serde(rename = "NOTIFIED")]
    Notified,
    #[serde(rename = "RESET")]
    Reset,
}

/// Incident severity. Ordered so that an upgrade is a simple `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    #[serde(rename = "")]
    None,
    #[serde(rename = "AMBER")]
    Amber,
    #[serde(rename = "RED")]
    Red,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "",
            Severity::Amber => "AMBER",
            Severity::Red => "RED",
        }
    }
}

/// The stored watchdog state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchdogState {
    pub phase: Phase,
    pub severity: Severity,
    /// Identifier of the incident currently open, empty otherwise.
    pub current_issue_id: String,
}

impl Default for WatchdogState {
    fn default() -> Self {
        Self {
            phase: Phase::Reset,
            severity: Severity::None,
            current_issue_id: String::new(),
        }
    }
}

/// What a transition asks the mailer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Escalate { issue_id: String, severity: Severity },
    Resolve { issue_id: String },
}

/// The candidate state one probe summary argues for.
pub fn candidate(input: &ProbeSummary) -> (Phase, Severity) {
    if !input.progressing {
        (Phase::Detected, Severity::Red)
    } else if input.unreachable > 0 || input.stuck > 0 {
        (Phase::Detected, Severity::Amber)
    } else {
        (Phase::Ok, Severity::None)
    }
}

/// Advances the machine by one probe. `mint_issue_id` is called exactly
/// when a fresh incident opens.
pub fn advance(
    state: &WatchdogState,
    input: &ProbeSummary,
    mint_issue_id: impl FnOnce() -> String,
) -> (WatchdogState, Option<Notification>) {
    let (next_phase, next_severity) = candidate(input);

    match (state.phase, next_phase) {
        // Healthy, staying healthy. Leaving RESET quietly is fine too.
        (Phase::Ok | Phase::Reset, Phase::Ok) => (
            WatchdogState {
                phase: Phase::Ok,
                severity: Severity::None,
                current_issue_id: state.current_issue_id.clone(),
            },
            None,
        ),

        // A fresh incident: escalate and go straight to NOTIFIED.
        (Phase::Ok | Phase::Reset, _) => {
            let issue_id = mint_issue_id();
            (
                WatchdogState {
                    phase: Phase::Notified,
                    severity: next_severity,
                    current_issue_id: issue_id.clone(),
                },
                Some(Notification::Escalate {
                    issue_id,
                    severity: next_severity,
                }),
            )
        }

        // Recovery: resolve the open incident exactly once.
        (Phase::Detected | Phase::Notified, Phase::Ok) => (
            WatchdogState {
                phase: Phase::Ok,
                severity: Severity::None,
                current_issue_id: String::new(),
            },
            Some(Notification::Resolve {
                issue_id: state.current_issue_id.clone(),
            }),
        ),

        // Ongoing incident: only an upgrade speaks, under the same issue.
        (Phase::Detected | Phase::Notified, _) => {
            if next_severity > state.severity {
                (
                    WatchdogState {
                        phase: Phase::Notified,
                        severity: next_severity,
                        current_issue_id: state.current_issue_id.clone(),
                    },
                    Some(Notification::Escalate {
                        issue_id: state.current_issue_id.clone(),
                        severity: next_severity,
                    }),
                )
            } else {
                // Downgrades keep the recorded severity so an AMBER<->RED
                // flap cannot produce a second upgrade notice.
                (state.clone(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(progressing: bool, unreachable: usize, stuck: usize) -> ProbeSummary {
        ProbeSummary {
            progressing,
            unreachable,
            stuck,
        }
    }

    fn run(
        inputs: &[(bool, usize, usize)],
    ) -> (WatchdogState, Vec<Notification>) {
        let mut state = WatchdogState::default();
        let mut notices = Vec::new();
        let mut counter = 0u32;
        for &(p, u, s) in inputs {
            let (next, notice) = advance(&state, &summary(p, u, s), || {
                counter += 1;
                format!("issue-{counter}")
            });
            state = next;
            notices.extend(notice);
        }
        (state, notices)
    }

    #[test]
    fn candidate_severity_derivation() {
        assert_eq!(candidate(&summary(true, 0, 0)), (Phase::Ok, Severity::None));
        assert_eq!(
            candidate(&summary(true, 1, 0)),
            (Phase::Detected, Severity::Amber)
        );
        assert_eq!(
            candidate(&summary(true, 0, 2)),
            (Phase::Detected, Severity::Amber)
        );
        assert_eq!(
            candidate(&summary(false, 0, 0)),
            (Phase::Detected, Severity::Red)
        );
        assert_eq!(
            candidate(&summary(false, 1, 2)),
            (Phase::Detected, Severity::Red)
        );
    }

    #[test]
    fn healthy_probes_never_notify() {
        let (state, notices) = run(&[(true, 0, 0), (true, 0, 0), (true, 0, 0)]);
        assert_eq!(state.phase, Phase::Ok);
        assert!(notices.is_empty());
    }

    #[test]
    fn escalate_then_resolve_with_same_issue() {
        let (state, notices) = run(&[(true, 0, 0), (true, 1, 0), (true, 0, 0)]);
        assert_eq!(state.phase, Phase::Ok);
        assert!(state.current_issue_id.is_empty());
        assert_eq!(
            notices,
            vec![
                Notification::Escalate {
                    issue_id: "issue-1".into(),
                    severity: Severity::Amber
                },
                Notification::Resolve {
                    issue_id: "issue-1".into()
                },
            ]
        );
    }

    #[test]
    fn severity_upgrade_reuses_the_issue() {
        let (state, notices) = run(&[(true, 0, 0), (true, 1, 0), (false, 1, 2)]);
        assert_eq!(state.phase, Phase::Notified);
        assert_eq!(state.severity, Severity::Red);
        assert_eq!(
            notices,
            vec![
                Notification::Escalate {
                    issue_id: "issue-1".into(),
                    severity: Severity::Amber
                },
                Notification::Escalate {
                    issue_id: "issue-1".into(),
                    severity: Severity::Red
                },
            ]
        );
    }

    #[test]
    fn downgrade_without_recovery_is_silent() {
        let (state, notices) = run(&[(false, 1, 2), (true, 1, 0), (false, 1, 2)]);
        // One RED escalate; the dip to AMBER neither notifies nor lowers
        // the recorded severity, so the return to RED is silent too.
        assert_eq!(notices.len(), 1);
        assert_eq!(state.severity, Severity::Red);
    }

    #[test]
    fn repeated_amber_probes_notify_once() {
        let (_, notices) = run(&[(true, 1, 0), (true, 1, 0), (true, 2, 1)]);
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn exactly_one_resolution_per_incident() {
        let (_, notices) = run(&[
            (true, 1, 0),
            (true, 0, 0),
            (true, 0, 0),
            (false, 0, 3),
            (true, 0, 0),
        ]);
        let resolves = notices
            .iter()
            .filter(|n| matches!(n, Notification::Resolve { .. }))
            .count();
        assert_eq!(resolves, 2);
        // Each incident resolved under its own id.
        assert_eq!(
            notices,
            vec![
                Notification::Escalate {
                    issue_id: "issue-1".into(),
                    severity: Severity::Amber
                },
                Notification::Resolve {
                    issue_id: "issue-1".into()
                },
                Notification::Escalate {
                    issue_id: "issue-2".into(),
                    severity: Severity::Red
                },
                Notification::Resolve {
                    issue_id: "issue-2".into()
                },
            ]
        );
    }

    #[test]
    fn reset_escalates_like_ok() {
        let state = WatchdogState::default();
        assert_eq!(state.phase, Phase::Reset);
        let (next, notice) = advance(&state, &summary(false, 2, 0), || "issue-9".into());
        assert_eq!(next.phase, Phase::Notified);
        assert_eq!(next.severity, Severity::Red);
        assert!(matches!(notice, Some(Notification::Escalate { .. })));
    }
}
