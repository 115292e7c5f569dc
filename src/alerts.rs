use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AlertError;
use crate::models::{Alert, AlertStatus, RiskProfile};

/// Reason prefix shared by every threshold alert; used as the duplicate key.
pub const HIGH_RISK_PREFIX: &str = "High risk score detected";

/// Allowed status moves. Resolved and dismissed alerts are terminal.
const TRANSITIONS: &[(AlertStatus, AlertStatus)] = &[
    (AlertStatus::Open, AlertStatus::Open),
    (AlertStatus::Open, AlertStatus::Resolved),
    (AlertStatus::Open, AlertStatus::Dismissed),
];

pub fn can_transition(from: AlertStatus, to: AlertStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

#[derive(Debug, Clone, Copy)]
pub struct AlertManager {
    high_risk_threshold: f64,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self {
            high_risk_threshold: 0.7,
        }
    }
}

impl AlertManager {
    pub fn new(high_risk_threshold: f64) -> Self {
        Self {
            high_risk_threshold,
        }
    }

    pub fn evaluate(
        &self,
        student_id: Uuid,
        profile: &RiskProfile,
        open_alerts: &[Alert],
    ) -> Option<Alert> {
        self.evaluate_at(student_id, profile, open_alerts, Utc::now())
    }

    /// Decides whether a fresh profile warrants a new alert.
    ///
    /// Returns `None` below the high-risk threshold, or when the student
    /// already has an open threshold alert.
    pub fn evaluate_at(
        &self,
        student_id: Uuid,
        profile: &RiskProfile,
        open_alerts: &[Alert],
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if profile.score < self.high_risk_threshold {
            return None;
        }

        let duplicate = open_alerts
            .iter()
            .any(|a| a.status == AlertStatus::Open && a.reason.starts_with(HIGH_RISK_PREFIX));
        if duplicate {
            return None;
        }

        Some(Alert {
            id: Uuid::new_v4(),
            student_id,
            risk_score: profile.score,
            reason: format!("{HIGH_RISK_PREFIX}: {}", profile.summary),
            status: AlertStatus::Open,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
        })
    }
}

/// Applies a status change given as its wire name.
pub fn set_status(alert: &mut Alert, status: &str, actor_id: Uuid) -> Result<(), AlertError> {
    let status = status.parse::<AlertStatus>()?;
    transition(alert, status, actor_id, Utc::now())
}

pub fn transition(
    alert: &mut Alert,
    to: AlertStatus,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AlertError> {
    if !can_transition(alert.status, to) {
        return Err(AlertError::InvalidTransition {
            from: alert.status,
            to,
        });
    }

    alert.status = to;
    if to.is_closed() {
        alert.resolved_by = Some(actor_id);
        alert.resolved_at = Some(now);
    } else {
        alert.resolved_by = None;
        alert.resolved_at = None;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use crate::risk::HIGH_RISK_SUMMARY;

    fn profile(score: f64) -> RiskProfile {
        RiskProfile {
            score,
            level: crate::risk::risk_level(score),
            summary: HIGH_RISK_SUMMARY.to_string(),
            factors: Vec::new(),
        }
    }

    fn open_alert(student_id: Uuid, reason: &str) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            student_id,
            risk_score: 0.8,
            reason: reason.to_string(),
            status: AlertStatus::Open,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn below_threshold_raises_nothing() {
        let manager = AlertManager::default();
        assert!(manager.evaluate(Uuid::new_v4(), &profile(0.69), &[]).is_none());
    }

    #[test]
    fn high_score_opens_alert() {
        let manager = AlertManager::default();
        let student_id = Uuid::new_v4();
        let alert = manager
            .evaluate(student_id, &profile(0.78), &[])
            .expect("alert expected");

        assert_eq!(alert.student_id, student_id);
        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.risk_score, 0.78);
        assert!(alert
            .reason
            .starts_with("High risk score detected: Student is at high risk"));
        assert!(alert.resolved_by.is_none());
        assert!(alert.resolved_at.is_none());
        assert_eq!(profile(0.78).level, RiskLevel::High);
    }

    #[test]
    fn existing_open_alert_suppresses_duplicate() {
        let manager = AlertManager::default();
        let student_id = Uuid::new_v4();
        let existing = open_alert(student_id, "High risk score detected: earlier run");
        assert!(manager
            .evaluate(student_id, &profile(0.9), &[existing])
            .is_none());
    }

    #[test]
    fn unrelated_open_alert_does_not_suppress() {
        let manager = AlertManager::default();
        let student_id = Uuid::new_v4();
        let existing = open_alert(
            student_id,
            "Significant drop in grades and increasing submission delays detected.",
        );
        assert!(manager
            .evaluate(student_id, &profile(0.9), &[existing])
            .is_some());
    }

    #[test]
    fn resolving_records_actor_and_time() {
        let actor = Uuid::new_v4();
        let mut alert = open_alert(Uuid::new_v4(), "High risk score detected: x");
        set_status(&mut alert, "RESOLVED", actor).unwrap();

        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by, Some(actor));
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut alert = open_alert(Uuid::new_v4(), "High risk score detected: x");
        let err = set_status(&mut alert, "BOGUS", Uuid::new_v4()).unwrap_err();
        assert_eq!(
            err,
            AlertError::InvalidStatus {
                status: "BOGUS".to_string()
            }
        );
        assert_eq!(alert.status, AlertStatus::Open);
    }

    #[test]
    fn open_to_open_is_a_no_op() {
        let mut alert = open_alert(Uuid::new_v4(), "High risk score detected: x");
        set_status(&mut alert, "OPEN", Uuid::new_v4()).unwrap();
        assert_eq!(alert.status, AlertStatus::Open);
        assert!(alert.resolved_by.is_none());
        assert!(alert.resolved_at.is_none());
    }

    #[test]
    fn closed_alerts_are_terminal() {
        let actor = Uuid::new_v4();
        let mut alert = open_alert(Uuid::new_v4(), "High risk score detected: x");
        set_status(&mut alert, "DISMISSED", actor).unwrap();

        for target in ["OPEN", "RESOLVED", "DISMISSED"] {
            let err = set_status(&mut alert, target, Uuid::new_v4()).unwrap_err();
            assert!(matches!(err, AlertError::InvalidTransition { .. }));
        }
        assert_eq!(alert.status, AlertStatus::Dismissed);
        assert_eq!(alert.resolved_by, Some(actor));
    }
}
