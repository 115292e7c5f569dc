use chrono::{Duration, TimeZone, Utc};
use lighthouse_risk_monitor::risk::{compute_risk, risk_level};
use lighthouse_risk_monitor::SubmissionRecord;
use proptest::prelude::*;

fn history() -> impl Strategy<Value = Vec<SubmissionRecord>> {
    let submission = (
        0i64..90,
        -72i64..72,
        proptest::option::of(0.0f64..=1.0),
        1u32..=200,
    )
        .prop_map(|(day, offset_hours, fraction, max_score)| {
            let due = Utc.with_ymd_and_hms(2026, 1, 5, 23, 59, 0).unwrap() + Duration::days(day);
            let max_score = f64::from(max_score);
            SubmissionRecord::new(
                due + Duration::hours(offset_hours),
                fraction.map(|f| f * max_score),
                due,
                max_score,
            )
            .unwrap()
        });
    proptest::collection::vec(submission, 0..24)
}

proptest! {
    #[test]
    fn score_stays_in_unit_range(submissions in history()) {
        let profile = compute_risk(&submissions);
        prop_assert!((0.0..=1.0).contains(&profile.score));
    }

    #[test]
    fn level_matches_score_bucket(submissions in history()) {
        let profile = compute_risk(&submissions);
        prop_assert_eq!(profile.level, risk_level(profile.score));
    }

    #[test]
    fn impacts_bound_the_score(submissions in history()) {
        let profile = compute_risk(&submissions);
        let raw: f64 = profile.factors.iter().map(|f| f.impact).sum();
        prop_assert!((profile.score - raw.min(1.0)).abs() < 0.005 + 1e-9);
    }

    #[test]
    fn scoring_is_repeatable(submissions in history()) {
        prop_assert_eq!(compute_risk(&submissions), compute_risk(&submissions));
    }
}
