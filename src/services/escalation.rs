//! Phased alert transition table
//!
//! The four phases form a closed sum type with an explicit transition
//! table so escalation logic stays exhaustively checkable. Automatic
//! progression is strictly monotonic; only an explicit
//! confirmation-of-safety returns a session to `Normal`.

use crate::domain::session::{AlertPhase, AnomalyKind};
use crate::infra::Config;
use std::time::Duration;

/// Grace windows for automatic phase advancement.
///
/// Values come from caller configuration; there is no built-in default.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    /// Wait for confirmation in soft-check before escalating
    pub soft_check_grace: Duration,
    /// Wait for confirmation in escalation before emergency
    pub escalation_grace: Duration,
}

impl EscalationPolicy {
    pub fn new(soft_check_grace: Duration, escalation_grace: Duration) -> Self {
        Self { soft_check_grace, escalation_grace }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.soft_check_grace_secs()),
            Duration::from_secs(config.escalation_grace_secs()),
        )
    }

    /// Next phase when an anomaly fires in `phase`, if any.
    ///
    /// A first anomaly opens a soft check; any further anomaly during the
    /// soft check escalates; only a stop in an unsafe area pushes an
    /// escalated session to emergency. Emergency absorbs everything.
    pub fn on_anomaly(&self, phase: AlertPhase, kind: AnomalyKind) -> Option<AlertPhase> {
        match (phase, kind) {
            (AlertPhase::Normal, _) => Some(AlertPhase::SoftCheck),
            (AlertPhase::SoftCheck, _) => Some(AlertPhase::Escalation),
            (AlertPhase::Escalation, AnomalyKind::StoppedUnsafe) => Some(AlertPhase::Emergency),
            (AlertPhase::Escalation, _) => None,
            (AlertPhase::Emergency, _) => None,
        }
    }

    /// Next phase when the grace window elapses without confirmation.
    pub fn on_grace_expired(&self, phase: AlertPhase) -> Option<AlertPhase> {
        match phase {
            AlertPhase::SoftCheck => Some(AlertPhase::Escalation),
            AlertPhase::Escalation => Some(AlertPhase::Emergency),
            AlertPhase::Normal | AlertPhase::Emergency => None,
        }
    }

    /// Next phase on explicit confirmation-of-safety.
    ///
    /// Any non-normal phase resets, including emergency (the operator
    /// clearing path).
    pub fn on_confirm_safe(&self, phase: AlertPhase) -> Option<AlertPhase> {
        match phase {
            AlertPhase::Normal => None,
            AlertPhase::SoftCheck | AlertPhase::Escalation | AlertPhase::Emergency => {
                Some(AlertPhase::Normal)
            }
        }
    }

    /// Grace window active in `phase`, if any.
    pub fn grace_for(&self, phase: AlertPhase) -> Option<Duration> {
        match phase {
            AlertPhase::SoftCheck => Some(self.soft_check_grace),
            AlertPhase::Escalation => Some(self.escalation_grace),
            AlertPhase::Normal | AlertPhase::Emergency => None,
        }
    }
}
