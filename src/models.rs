use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AlertError, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub student_number: String,
    pub name: String,
    pub email: String,
    pub enrollment_date: NaiveDate,
}

impl Student {
    pub fn new(
        student_number: &str,
        name: &str,
        email: &str,
        enrollment_date: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let student_number = student_number.trim();
        if student_number.is_empty() {
            return Err(ValidationError::EmptyStudentNumber);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let email = email.trim();
        let valid_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && domain.contains('.') && !domain.contains('@')
            }
            None => false,
        };
        if !valid_email {
            return Err(ValidationError::InvalidEmail {
                email: email.to_string(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            student_number: student_number.to_string(),
            name: name.to_string(),
            email: email.to_lowercase(),
            enrollment_date,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub course_code: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub max_score: f64,
}

impl Assignment {
    pub fn new(
        course_id: Uuid,
        title: &str,
        due_date: DateTime<Utc>,
        max_score: f64,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        check_max_score(max_score)?;

        Ok(Self {
            id: Uuid::new_v4(),
            course_id,
            title: title.to_string(),
            due_date,
            max_score,
        })
    }

    /// True when a stored assignment disagrees with freshly supplied details.
    pub fn differs_from(&self, due_date: DateTime<Utc>, max_score: f64) -> bool {
        self.due_date != due_date || self.max_score != max_score
    }

    /// Checks a grade against this assignment's bounds.
    pub fn check_grade(&self, grade: Option<f64>) -> Result<Option<f64>, ValidationError> {
        check_grade(grade, self.max_score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assignment_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub grade: Option<f64>,
}

/// A submission resolved against its assignment, as consumed by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    submitted_at: DateTime<Utc>,
    grade: Option<f64>,
    due_date: DateTime<Utc>,
    max_score: f64,
}

impl SubmissionRecord {
    pub fn new(
        submitted_at: DateTime<Utc>,
        grade: Option<f64>,
        due_date: DateTime<Utc>,
        max_score: f64,
    ) -> Result<Self, ValidationError> {
        check_max_score(max_score)?;
        let grade = check_grade(grade, max_score)?;

        Ok(Self {
            submitted_at,
            grade,
            due_date,
            max_score,
        })
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn grade(&self) -> Option<f64> {
        self.grade
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn max_score(&self) -> f64 {
        self.max_score
    }

    /// Grade as a fraction of the maximum score, if graded.
    pub fn grade_ratio(&self) -> Option<f64> {
        self.grade.map(|grade| grade / self.max_score)
    }

    /// Submitted strictly after the due date.
    pub fn is_late(&self) -> bool {
        self.submitted_at > self.due_date
    }
}

fn check_max_score(max_score: f64) -> Result<(), ValidationError> {
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(ValidationError::InvalidMaxScore { max_score });
    }
    Ok(())
}

fn check_grade(grade: Option<f64>, max_score: f64) -> Result<Option<f64>, ValidationError> {
    match grade {
        Some(grade) if !grade.is_finite() => Err(ValidationError::NonFiniteGrade { grade }),
        Some(grade) if grade < 0.0 => Err(ValidationError::NegativeGrade { grade }),
        Some(grade) if grade > max_score => {
            Err(ValidationError::GradeAboveMax { grade, max_score })
        }
        other => Ok(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub value: String,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub score: f64,
    pub level: RiskLevel,
    pub summary: String,
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "OPEN",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::Dismissed => "DISMISSED",
        }
    }

    /// Resolved and dismissed alerts carry who closed them and when.
    pub fn is_closed(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = AlertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OPEN" => Ok(AlertStatus::Open),
            "RESOLVED" => Ok(AlertStatus::Resolved),
            "DISMISSED" => Ok(AlertStatus::Dismissed),
            other => Err(AlertError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub student_id: Uuid,
    pub risk_score: f64,
    pub reason: String,
    pub status: AlertStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An open alert joined with the student it was raised for.
#[derive(Debug, Clone)]
pub struct AlertWithStudent {
    pub alert: Alert,
    pub student_name: String,
    pub student_email: String,
}

#[derive(Debug, Clone)]
pub struct StudentRisk {
    pub student: Student,
    pub profile: RiskProfile,
    pub average_grade: u32,
    pub late_submissions: usize,
    pub open_alerts: usize,
}

#[derive(Debug, Clone)]
pub struct LevelSummary {
    pub level: RiskLevel,
    pub count: usize,
    pub avg_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn submission_record_enforces_bounds() {
        assert!(SubmissionRecord::new(at(1), Some(80.0), at(2), 100.0).is_ok());
        assert!(SubmissionRecord::new(at(1), None, at(2), 100.0).is_ok());
        assert_eq!(
            SubmissionRecord::new(at(1), Some(10.0), at(2), 0.0),
            Err(ValidationError::InvalidMaxScore { max_score: 0.0 })
        );
        assert_eq!(
            SubmissionRecord::new(at(1), Some(-1.0), at(2), 100.0),
            Err(ValidationError::NegativeGrade { grade: -1.0 })
        );
        assert_eq!(
            SubmissionRecord::new(at(1), Some(101.0), at(2), 100.0),
            Err(ValidationError::GradeAboveMax {
                grade: 101.0,
                max_score: 100.0
            })
        );
    }

    #[test]
    fn non_finite_grades_are_rejected() {
        for grade in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = SubmissionRecord::new(at(1), Some(grade), at(2), 100.0).unwrap_err();
            assert!(matches!(err, ValidationError::NonFiniteGrade { .. }));
        }
    }

    #[test]
    fn student_requires_number_name_and_email() {
        let enrolled = NaiveDate::from_ymd_opt(2023, 9, 1).unwrap();
        assert_eq!(
            Student::new(" ", "Alice Johnson", "alice.j@university.edu", enrolled).unwrap_err(),
            ValidationError::EmptyStudentNumber
        );
        assert_eq!(
            Student::new("S003", "", "alice.j@university.edu", enrolled).unwrap_err(),
            ValidationError::EmptyName
        );
        assert!(matches!(
            Student::new("S003", "Alice Johnson", "not-an-email", enrolled),
            Err(ValidationError::InvalidEmail { .. })
        ));

        let student =
            Student::new(" S003 ", "Cara Diaz", "Cara.D@University.edu", enrolled).unwrap();
        assert_eq!(student.student_number, "S003");
        assert_eq!(student.email, "cara.d@university.edu");
    }

    #[test]
    fn assignment_detects_changed_details() {
        let assignment = Assignment::new(Uuid::new_v4(), "Quiz 1", at(5), 20.0).unwrap();
        assert!(!assignment.differs_from(at(5), 20.0));
        assert!(assignment.differs_from(at(6), 20.0));
        assert!(assignment.differs_from(at(5), 25.0));
    }

    #[test]
    fn lateness_is_strict() {
        let on_time = SubmissionRecord::new(at(2), None, at(2), 100.0).unwrap();
        let late = SubmissionRecord::new(at(3), None, at(2), 100.0).unwrap();
        assert!(!on_time.is_late());
        assert!(late.is_late());
    }

    #[test]
    fn assignment_requires_title() {
        let course_id = Uuid::new_v4();
        assert_eq!(
            Assignment::new(course_id, "   ", at(1), 100.0).unwrap_err(),
            ValidationError::EmptyTitle
        );
        let assignment = Assignment::new(course_id, " Midterm ", at(1), 50.0).unwrap();
        assert_eq!(assignment.title, "Midterm");
        assert!(assignment.check_grade(Some(60.0)).is_err());
    }

    #[test]
    fn alert_status_parses_wire_names() {
        assert_eq!("RESOLVED".parse::<AlertStatus>(), Ok(AlertStatus::Resolved));
        assert_eq!(
            "BOGUS".parse::<AlertStatus>(),
            Err(AlertError::InvalidStatus {
                status: "BOGUS".to_string()
            })
        );
        assert_eq!(AlertStatus::Dismissed.to_string(), "DISMISSED");
    }
}
