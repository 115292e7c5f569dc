use serde::{Deserialize, Serialize};

use crate::models::{RiskFactor, RiskLevel, RiskProfile, SubmissionRecord};

pub const NO_DATA_SUMMARY: &str = "No submission data available to calculate risk.";
pub const HIGH_RISK_SUMMARY: &str = "Student is at high risk. Immediate attention recommended.";
pub const MEDIUM_RISK_SUMMARY: &str =
    "Student is showing signs of potential risk. Monitoring is advised.";
pub const LOW_RISK_SUMMARY: &str = "Student appears to be performing well.";

/// Thresholds and weights of the scoring heuristic.
///
/// Grade thresholds are percentages (0-100), lateness thresholds are
/// fractions of all submissions, and level thresholds apply to the final
/// clamped score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub low_grade_pct: f64,
    pub low_grade_weight: f64,
    pub concerning_grade_pct: f64,
    pub concerning_grade_weight: f64,
    pub high_late_rate: f64,
    pub high_late_weight: f64,
    pub some_late_rate: f64,
    pub some_late_weight: f64,
    pub decline_ratio: f64,
    pub decline_weight: f64,
    pub medium_threshold: f64,
    pub high_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            low_grade_pct: 60.0,
            low_grade_weight: 0.4,
            concerning_grade_pct: 75.0,
            concerning_grade_weight: 0.2,
            high_late_rate: 0.5,
            high_late_weight: 0.4,
            some_late_rate: 0.2,
            some_late_weight: 0.2,
            decline_ratio: 0.8,
            decline_weight: 0.3,
            medium_threshold: 0.4,
            high_threshold: 0.7,
        }
    }
}

/// Per-student figures shown next to the risk profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionStats {
    pub average_grade: u32,
    pub late_submissions: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn compute_risk(&self, submissions: &[SubmissionRecord]) -> RiskProfile {
        if submissions.is_empty() {
            return RiskProfile {
                score: 0.0,
                level: RiskLevel::Low,
                summary: NO_DATA_SUMMARY.to_string(),
                factors: Vec::new(),
            };
        }

        let cfg = &self.config;
        let mut total = 0.0_f64;
        let mut factors = Vec::new();
        let mut push = |name: &str, value: String, impact: f64| {
            total += impact;
            factors.push(RiskFactor {
                name: name.to_string(),
                value,
                impact,
            });
        };

        let mut graded: Vec<&SubmissionRecord> =
            submissions.iter().filter(|s| s.grade().is_some()).collect();

        if let Some(avg) = mean_ratio(&graded) {
            let avg_pct = avg * 100.0;
            if avg_pct < cfg.low_grade_pct {
                push("Low Average Grade", format_pct(avg_pct, 1), cfg.low_grade_weight);
            } else if avg_pct < cfg.concerning_grade_pct {
                push(
                    "Concerning Average Grade",
                    format_pct(avg_pct, 1),
                    cfg.concerning_grade_weight,
                );
            }
        }

        let late_count = submissions.iter().filter(|s| s.is_late()).count();
        let late_rate = late_count as f64 / submissions.len() as f64;
        if late_rate > cfg.high_late_rate {
            push(
                "High Rate of Late Submissions",
                format_pct(late_rate * 100.0, 0),
                cfg.high_late_weight,
            );
        } else if late_rate > cfg.some_late_rate {
            push(
                "Some Late Submissions",
                format_pct(late_rate * 100.0, 0),
                cfg.some_late_weight,
            );
        }

        if graded.len() >= 2 {
            graded.sort_by_key(|s| s.submitted_at());
            let n = graded.len();
            // With an odd count the middle submission sits in neither half.
            let first = mean_ratio(&graded[..n / 2]);
            let second = mean_ratio(&graded[n.div_ceil(2)..]);
            if let (Some(first), Some(second)) = (first, second) {
                if second < first * cfg.decline_ratio {
                    push(
                        "Declining Performance Trend",
                        format!(
                            "From {} to {}",
                            format_pct(first * 100.0, 0),
                            format_pct(second * 100.0, 0)
                        ),
                        cfg.decline_weight,
                    );
                }
            }
        }

        let score = round_score(total.min(1.0));
        let level = self.level_for(score);
        let summary = match level {
            RiskLevel::High => HIGH_RISK_SUMMARY,
            RiskLevel::Medium => MEDIUM_RISK_SUMMARY,
            RiskLevel::Low => LOW_RISK_SUMMARY,
        };

        RiskProfile {
            score,
            level,
            summary: summary.to_string(),
            factors,
        }
    }

    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score >= self.config.high_threshold {
            RiskLevel::High
        } else if score >= self.config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Scores a submission history with the default thresholds.
pub fn compute_risk(submissions: &[SubmissionRecord]) -> RiskProfile {
    RiskScorer::default().compute_risk(submissions)
}

/// Buckets a score with the default thresholds.
pub fn risk_level(score: f64) -> RiskLevel {
    RiskScorer::default().level_for(score)
}

pub fn submission_stats(submissions: &[SubmissionRecord]) -> SubmissionStats {
    let graded: Vec<&SubmissionRecord> =
        submissions.iter().filter(|s| s.grade().is_some()).collect();
    let average_grade = mean_ratio(&graded)
        .map(|avg| (avg * 100.0).round() as u32)
        .unwrap_or(0);

    SubmissionStats {
        average_grade,
        late_submissions: submissions.iter().filter(|s| s.is_late()).count(),
    }
}

fn mean_ratio(submissions: &[&SubmissionRecord]) -> Option<f64> {
    let ratios: Vec<f64> = submissions.iter().filter_map(|s| s.grade_ratio()).collect();
    if ratios.is_empty() {
        return None;
    }
    Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
}

/// Percentage label with ties rounded away from zero.
fn format_pct(pct: f64, decimals: u32) -> String {
    let scale = 10f64.powi(decimals as i32);
    format!("{:.*}%", decimals as usize, (pct * scale).round() / scale)
}

fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}
