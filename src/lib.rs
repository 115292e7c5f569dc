//! Student risk scoring and alert lifecycle, with a Postgres-backed store.

pub mod alerts;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod risk;
pub mod service;

pub use alerts::AlertManager;
pub use error::{AlertError, ValidationError};
pub use models::{Alert, AlertStatus, RiskFactor, RiskLevel, RiskProfile, SubmissionRecord};
pub use risk::{RiskConfig, RiskScorer};
