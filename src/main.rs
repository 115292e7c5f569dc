use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use lighthouse_risk_monitor::config::{self, AppConfig};
use lighthouse_risk_monitor::db::{self, AssignmentRef, ScoreInput};
use lighthouse_risk_monitor::models::Student;
use lighthouse_risk_monitor::{report, risk, AlertManager, RiskScorer};

#[derive(Parser)]
#[command(name = "lighthouse")]
#[command(about = "Student risk monitoring for counselors", long_about = None)]
struct Cli {
    /// JSON file overriding risk thresholds and weights
    #[arg(long, global = true)]
    risk_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample counselor, courses, students and submissions
    Seed,
    /// Import scores from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Register a student
    AddStudent {
        #[arg(long)]
        student_number: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// YYYY-MM-DD
        #[arg(long)]
        enrollment_date: NaiveDate,
        /// Course code to enroll in; repeatable
        #[arg(long = "course")]
        courses: Vec<String>,
    },
    /// Record a submission and rescore the student
    #[command(group(
        ArgGroup::new("assignment")
            .args(["assignment_id", "course_code"])
            .required(true)
            .multiple(false)
    ))]
    AddScore {
        #[arg(long)]
        email: String,
        #[arg(long)]
        assignment_id: Option<Uuid>,
        #[arg(long, requires_all = ["title", "due_date", "max_score"])]
        course_code: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        due_date: Option<DateTime<Utc>>,
        #[arg(long)]
        max_score: Option<f64>,
        #[arg(long)]
        submitted_at: DateTime<Utc>,
        #[arg(long)]
        grade: Option<f64>,
    },
    /// List students by risk score
    Students {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one student's risk profile and alerts
    Student {
        #[arg(long)]
        email: String,
    },
    /// List courses
    Courses,
    /// List open alerts by risk score
    Alerts,
    /// Resolve, dismiss or keep open an alert
    SetAlertStatus {
        #[arg(long)]
        alert_id: Uuid,
        /// OPEN, RESOLVED or DISMISSED
        #[arg(long)]
        status: String,
        #[arg(long)]
        actor_id: Uuid,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing();
    let cli = Cli::parse();
    let app_config = AppConfig::from_env()?;
    let risk_config = config::load_risk_config(cli.risk_config.as_deref())?;
    let scorer = RiskScorer::new(risk_config);
    let manager = AlertManager::new(risk_config.high_threshold);

    let pool = PgPoolOptions::new()
        .max_connections(app_config.max_connections)
        .connect(&app_config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, &scorer, &manager).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &scorer, &manager, &csv).await?;
            println!("Inserted {inserted} scores from {}.", csv.display());
        }
        Commands::AddStudent {
            student_number,
            name,
            email,
            enrollment_date,
            courses,
        } => {
            let student = Student::new(&student_number, &name, &email, enrollment_date)?;
            db::create_student(&pool, &student, &courses).await?;
            println!(
                "Registered {} ({}, {}).",
                student.name, student.student_number, student.email
            );
        }
        Commands::AddScore {
            email,
            assignment_id,
            course_code,
            title,
            due_date,
            max_score,
            submitted_at,
            grade,
        } => {
            let assignment = match (assignment_id, course_code, title, due_date, max_score) {
                (Some(id), _, _, _, _) => AssignmentRef::Existing(id),
                (None, Some(course_code), Some(title), Some(due_date), Some(max_score)) => {
                    AssignmentRef::New {
                        course_code,
                        title,
                        due_date,
                        max_score,
                    }
                }
                _ => anyhow::bail!(
                    "provide --assignment-id or --course-code with --title, --due-date and --max-score"
                ),
            };
            let input = ScoreInput {
                student_email: email,
                assignment,
                submitted_at,
                grade,
                source_key: None,
            };

            let outcome = db::add_score(&pool, &scorer, &manager, &input)
                .await?
                .context("submission was not recorded")?;
            println!(
                "Score added. Risk {:.2} ({}): {}",
                outcome.profile.score, outcome.profile.level, outcome.profile.summary
            );
            if let Some(alert) = outcome.alert {
                println!("Opened alert {}: {}", alert.id, alert.reason);
            }
        }
        Commands::Students { limit } => {
            let students = db::list_students(&pool, &scorer).await?;
            if students.is_empty() {
                println!("No students registered.");
                return Ok(());
            }

            println!("Students by risk score:");
            for entry in students.iter().take(limit) {
                println!(
                    "- {} ({}, {}) score {:.2} [{}] with {} open alerts",
                    entry.student.name,
                    entry.student.student_number,
                    entry.student.email,
                    entry.profile.score,
                    entry.profile.level,
                    entry.open_alerts
                );
            }
        }
        Commands::Student { email } => {
            let student = db::find_student(&pool, &email).await?;
            let history = db::student_history(&pool, student.id).await?;
            let alerts = db::student_alerts(&pool, student.id).await?;
            let profile = scorer.compute_risk(&history);
            let stats = risk::submission_stats(&history);

            println!("{} ({}, {})", student.name, student.student_number, student.email);
            println!("Enrolled {}", student.enrollment_date);
            println!("Risk {:.2} ({}): {}", profile.score, profile.level, profile.summary);
            println!(
                "Average grade {}%, {} late of {} submissions",
                stats.average_grade,
                stats.late_submissions,
                history.len()
            );
            for factor in profile.factors.iter() {
                println!("- {}: {} (+{:.1})", factor.name, factor.value, factor.impact);
            }
            for alert in alerts.iter() {
                println!(
                    "Alert {} [{}] score {:.2}: {}",
                    alert.id, alert.status, alert.risk_score, alert.reason
                );
            }
        }
        Commands::Courses => {
            for course in db::list_courses(&pool).await? {
                println!("- {} {}", course.course_code, course.title);
            }
        }
        Commands::Alerts => {
            let alerts = db::list_open_alerts(&pool).await?;
            if alerts.is_empty() {
                println!("No open alerts.");
                return Ok(());
            }

            for entry in alerts.iter() {
                println!(
                    "- {} {} ({}) score {:.2}: {}",
                    entry.alert.id,
                    entry.student_name,
                    entry.student_email,
                    entry.alert.risk_score,
                    entry.alert.reason
                );
            }
        }
        Commands::SetAlertStatus {
            alert_id,
            status,
            actor_id,
        } => {
            let alert = db::update_alert_status(&pool, alert_id, &status, actor_id).await?;
            println!("Alert {} is now {}.", alert.id, alert.status);
        }
        Commands::Report { out } => {
            let students = db::list_students(&pool, &scorer).await?;
            let alerts = db::list_open_alerts(&pool).await?;
            let report = report::build_report(Utc::now(), &students, &alerts);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
