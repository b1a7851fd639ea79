use chrono::{DateTime, Utc};

use crate::model::IntegrityViolation;

/// Actions the exam environment blocks outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictedAction {
    Copy,
    Paste,
    ContextMenu,
}

/// Environment signal delivered by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentSignal {
    VisibilityLost,
    Restricted(RestrictedAction),
}

/// How the presentation layer should react to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalResponse {
    /// Cancel the underlying browser/OS action.
    pub prevent_default: bool,
    /// Set when the signal was logged as a violation.
    pub violation: Option<IntegrityViolation>,
}

/// Counts visibility losses and suppresses restricted actions.
///
/// Violations never stop the attempt. Once detached, the monitor ignores
/// everything so a finished attempt cannot leak into the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityMonitor {
    attached: bool,
    violations: Vec<IntegrityViolation>,
    pending_notice: Option<IntegrityViolation>,
}

impl IntegrityMonitor {
    /// Creates a monitor that is already listening.
    #[must_use]
    pub fn attached() -> Self {
        Self {
            attached: true,
            ..Self::default()
        }
    }

    /// Stops listening. Idempotent.
    pub fn detach(&mut self) {
        self.attached = false;
        self.pending_notice = None;
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn observe(&mut self, signal: EnvironmentSignal, at: DateTime<Utc>) -> SignalResponse {
        if !self.attached {
            return SignalResponse::default();
        }
        match signal {
            EnvironmentSignal::VisibilityLost => {
                let sequence = u32::try_from(self.violations.len())
                    .unwrap_or(u32::MAX)
                    .saturating_add(1);
                let violation = IntegrityViolation {
                    occurred_at: at,
                    sequence,
                };
                self.violations.push(violation);
                self.pending_notice = Some(violation);
                SignalResponse {
                    prevent_default: false,
                    violation: Some(violation),
                }
            }
            EnvironmentSignal::Restricted(_) => SignalResponse {
                prevent_default: true,
                violation: None,
            },
        }
    }

    #[must_use]
    pub fn violations(&self) -> &[IntegrityViolation] {
        &self.violations
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        u32::try_from(self.violations.len()).unwrap_or(u32::MAX)
    }

    /// Latest violation the user has not dismissed yet.
    #[must_use]
    pub fn pending_notice(&self) -> Option<IntegrityViolation> {
        self.pending_notice
    }

    pub fn acknowledge(&mut self) {
        self.pending_notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn visibility_losses_are_numbered_in_order() {
        let mut monitor = IntegrityMonitor::attached();
        let t0 = fixed_now();
        for i in 0..3 {
            let response = monitor.observe(EnvironmentSignal::VisibilityLost, t0 + Duration::seconds(i));
            assert!(!response.prevent_default);
            assert!(response.violation.is_some());
        }

        let sequences: Vec<u32> = monitor.violations().iter().map(|v| v.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(monitor.violations()[2].occurred_at, t0 + Duration::seconds(2));
        assert_eq!(monitor.violation_count(), 3);
    }

    #[test]
    fn restricted_actions_are_prevented_not_logged() {
        let mut monitor = IntegrityMonitor::attached();
        for action in [
            RestrictedAction::Copy,
            RestrictedAction::Paste,
            RestrictedAction::ContextMenu,
        ] {
            let response = monitor.observe(EnvironmentSignal::Restricted(action), fixed_now());
            assert!(response.prevent_default);
            assert_eq!(response.violation, None);
        }
        assert_eq!(monitor.violation_count(), 0);
    }

    #[test]
    fn notice_stays_until_acknowledged() {
        let mut monitor = IntegrityMonitor::attached();
        monitor.observe(EnvironmentSignal::VisibilityLost, fixed_now());
        assert_eq!(monitor.pending_notice().map(|v| v.sequence), Some(1));
        monitor.acknowledge();
        assert_eq!(monitor.pending_notice(), None);
    }

    #[test]
    fn detached_monitor_ignores_signals() {
        let mut monitor = IntegrityMonitor::attached();
        monitor.observe(EnvironmentSignal::VisibilityLost, fixed_now());
        monitor.detach();

        let response = monitor.observe(EnvironmentSignal::VisibilityLost, fixed_now());
        assert_eq!(response, SignalResponse::default());
        let response = monitor.observe(
            EnvironmentSignal::Restricted(RestrictedAction::Copy),
            fixed_now(),
        );
        assert!(!response.prevent_default);
        assert_eq!(monitor.violation_count(), 1);
        assert!(!monitor.is_attached());
    }
}
