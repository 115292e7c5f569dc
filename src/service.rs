use tracing::{debug, info};
use uuid::Uuid;

use crate::alerts::AlertManager;
use crate::models::{Alert, RiskLevel, RiskProfile, SubmissionRecord};
use crate::risk::RiskScorer;

/// Storage seam for one score-then-alert step.
///
/// Implementations should present a consistent snapshot of the student and
/// serialize concurrent rescoring of the same student.
#[allow(async_fn_in_trait)]
pub trait RiskStore {
    async fn submission_history(&mut self, student_id: Uuid)
        -> anyhow::Result<Vec<SubmissionRecord>>;

    async fn open_alerts(&mut self, student_id: Uuid) -> anyhow::Result<Vec<Alert>>;

    async fn insert_alert(&mut self, alert: &Alert) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct RescoreOutcome {
    pub profile: RiskProfile,
    pub alert: Option<Alert>,
}

pub async fn rescore_student<S: RiskStore>(
    store: &mut S,
    scorer: &RiskScorer,
    manager: &AlertManager,
    student_id: Uuid,
) -> anyhow::Result<RescoreOutcome> {
    let history = store.submission_history(student_id).await?;
    let profile = scorer.compute_risk(&history);
    debug!(
        %student_id,
        score = profile.score,
        level = %profile.level,
        factors = profile.factors.len(),
        "risk recomputed"
    );

    let open_alerts = store.open_alerts(student_id).await?;
    let alert = manager.evaluate(student_id, &profile, &open_alerts);

    match &alert {
        Some(alert) => {
            store.insert_alert(alert).await?;
            info!(%student_id, alert_id = %alert.id, score = alert.risk_score, "high risk alert raised");
        }
        None if profile.level == RiskLevel::High => {
            info!(%student_id, score = profile.score, "high risk alert already open");
        }
        None => {}
    }

    Ok(RescoreOutcome { profile, alert })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertStatus;
    use chrono::{Duration, TimeZone, Utc};

    #[derive(Default)]
    struct MemoryStore {
        history: Vec<SubmissionRecord>,
        alerts: Vec<Alert>,
    }

    impl RiskStore for MemoryStore {
        async fn submission_history(
            &mut self,
            _student_id: Uuid,
        ) -> anyhow::Result<Vec<SubmissionRecord>> {
            Ok(self.history.clone())
        }

        async fn open_alerts(&mut self, student_id: Uuid) -> anyhow::Result<Vec<Alert>> {
            Ok(self
                .alerts
                .iter()
                .filter(|a| a.student_id == student_id && a.status == AlertStatus::Open)
                .cloned()
                .collect())
        }

        async fn insert_alert(&mut self, alert: &Alert) -> anyhow::Result<()> {
            self.alerts.push(alert.clone());
            Ok(())
        }
    }

    fn failing_history() -> Vec<SubmissionRecord> {
        let base = Utc.with_ymd_and_hms(2026, 1, 10, 17, 0, 0).unwrap();
        (0..4)
            .map(|i| {
                let due = base + Duration::days(i * 7);
                let grade = if i < 2 { 80.0 } else { 30.0 };
                SubmissionRecord::new(due + Duration::days(2), Some(grade), due, 100.0).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn repeated_high_scores_raise_one_alert() {
        let mut store = MemoryStore {
            history: failing_history(),
            ..MemoryStore::default()
        };
        let scorer = RiskScorer::default();
        let manager = AlertManager::default();
        let student_id = Uuid::new_v4();

        let first = rescore_student(&mut store, &scorer, &manager, student_id)
            .await
            .unwrap();
        assert!(first.alert.is_some());
        assert_eq!(first.profile.score, 1.0);

        let second = rescore_student(&mut store, &scorer, &manager, student_id)
            .await
            .unwrap();
        assert!(second.alert.is_none());
        assert_eq!(store.alerts.len(), 1);
    }

    #[tokio::test]
    async fn empty_history_stores_nothing() {
        let mut store = MemoryStore::default();
        let outcome = rescore_student(
            &mut store,
            &RiskScorer::default(),
            &AlertManager::default(),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.profile.score, 0.0);
        assert!(outcome.alert.is_none());
        assert!(store.alerts.is_empty());
    }
}
