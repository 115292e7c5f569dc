use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{AlertWithStudent, LevelSummary, RiskLevel, StudentRisk};

/// Counts students per risk level, highest level first; empty levels are kept.
pub fn summarize_by_level(students: &[StudentRisk]) -> Vec<LevelSummary> {
    [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low]
        .into_iter()
        .map(|level| {
            let scores: Vec<f64> = students
                .iter()
                .filter(|s| s.profile.level == level)
                .map(|s| s.profile.score)
                .collect();
            LevelSummary {
                level,
                count: scores.len(),
                avg_score: if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                },
            }
        })
        .collect()
}

pub fn build_report(
    generated_at: DateTime<Utc>,
    students: &[StudentRisk],
    alerts: &[AlertWithStudent],
) -> String {
    let summaries = summarize_by_level(students);

    let mut output = String::new();

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(
        output,
        "Generated {} for {} students",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        students.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");

    if students.is_empty() {
        let _ = writeln!(output, "No students registered.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg score {:.2})",
                summary.level, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    let at_risk: Vec<&StudentRisk> = students
        .iter()
        .filter(|s| s.profile.level != RiskLevel::Low)
        .collect();
    if at_risk.is_empty() {
        let _ = writeln!(output, "No students at medium or high risk.");
    } else {
        for entry in at_risk.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) score {:.2} [{}], avg grade {}%, {} late, {} open alerts",
                entry.student.name,
                entry.student.student_number,
                entry.student.email,
                entry.profile.score,
                entry.profile.level,
                entry.average_grade,
                entry.late_submissions,
                entry.open_alerts
            );
            for factor in entry.profile.factors.iter() {
                let _ = writeln!(
                    output,
                    "  - {}: {} (+{:.1})",
                    factor.name, factor.value, factor.impact
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Alerts");

    if alerts.is_empty() {
        let _ = writeln!(output, "No open alerts.");
    } else {
        for entry in alerts.iter() {
            let _ = writeln!(
                output,
                "- {} ({}) score {:.2} since {}: {}",
                entry.student_name,
                entry.student_email,
                entry.alert.risk_score,
                entry.alert.created_at.format("%Y-%m-%d"),
                entry.alert.reason
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, AlertStatus, RiskFactor, RiskProfile, Student};
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn student_risk(name: &str, score: f64, level: RiskLevel) -> StudentRisk {
        StudentRisk {
            student: Student {
                id: Uuid::new_v4(),
                student_number: "S001".to_string(),
                name: name.to_string(),
                email: format!("{}@university.edu", name.to_lowercase()),
                enrollment_date: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
            },
            profile: RiskProfile {
                score,
                level,
                summary: String::new(),
                factors: if level == RiskLevel::Low {
                    Vec::new()
                } else {
                    vec![RiskFactor {
                        name: "Low Average Grade".to_string(),
                        value: "52.0%".to_string(),
                        impact: 0.4,
                    }]
                },
            },
            average_grade: 52,
            late_submissions: 1,
            open_alerts: 0,
        }
    }

    #[test]
    fn distribution_counts_every_level() {
        let students = vec![
            student_risk("Alice", 0.9, RiskLevel::High),
            student_risk("Bob", 0.0, RiskLevel::Low),
            student_risk("Cara", 0.1, RiskLevel::Low),
        ];
        let summaries = summarize_by_level(&students);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].level, RiskLevel::High);
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[1].count, 0);
        assert_eq!(summaries[2].count, 2);
        assert!((summaries[2].avg_score - 0.05).abs() < 1e-9);
    }

    #[test]
    fn report_lists_factors_and_alerts() {
        let generated_at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
        let alice = student_risk("Alice", 0.9, RiskLevel::High);
        let alert = AlertWithStudent {
            alert: Alert {
                id: Uuid::new_v4(),
                student_id: alice.student.id,
                risk_score: 0.9,
                reason: "High risk score detected: Student is at high risk.".to_string(),
                status: AlertStatus::Open,
                resolved_by: None,
                resolved_at: None,
                created_at: generated_at,
            },
            student_name: "Alice".to_string(),
            student_email: "alice@university.edu".to_string(),
        };

        let report = build_report(generated_at, &[alice], &[alert]);
        assert!(report.contains("Generated 2026-03-02 08:30 UTC for 1 students"));
        assert!(report.contains("- High: 1 students (avg score 0.90)"));
        assert!(report.contains("  - Low Average Grade: 52.0% (+0.4)"));
        assert!(report.contains("score 0.90 since 2026-03-02: High risk score detected"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let report = build_report(Utc::now(), &[], &[]);
        assert!(report.contains("No students registered."));
        assert!(report.contains("No open alerts."));
    }
}
