use crate::models::AlertStatus;

/// Rejected input for a student, assignment or submission.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("maxScore must be a positive number, got {max_score}")]
    InvalidMaxScore { max_score: f64 },

    #[error("grade must be a finite number, got {grade}")]
    NonFiniteGrade { grade: f64 },

    #[error("grade cannot be negative, got {grade}")]
    NegativeGrade { grade: f64 },

    #[error("grade cannot exceed assignment maxScore ({max_score}), got {grade}")]
    GradeAboveMax { grade: f64, max_score: f64 },

    #[error("title is required")]
    EmptyTitle,

    #[error("student number cannot be empty")]
    EmptyStudentNumber,

    #[error("name cannot be empty")]
    EmptyName,

    #[error("invalid email address: {email}")]
    InvalidEmail { email: String },
}

/// Failures of the alert status state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlertError {
    #[error("invalid alert status: {status}")]
    InvalidStatus { status: String },

    #[error("alert cannot move from {from} to {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },
}
