use std::collections::HashMap;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{self, AlertManager};
use crate::models::{
    Alert, AlertStatus, AlertWithStudent, Assignment, Course, Student, StudentRisk, Submission,
    SubmissionRecord,
};
use crate::risk::{self, RiskScorer};
use crate::service::{self, RescoreOutcome, RiskStore};

pub const SEED_COUNSELOR_ID: &str = "6b1f8e3a-5c2d-4f7e-9a10-2c4d6e8f0a1b";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Which assignment a new score belongs to.
#[derive(Debug, Clone)]
pub enum AssignmentRef {
    Existing(Uuid),
    New {
        course_code: String,
        title: String,
        due_date: DateTime<Utc>,
        max_score: f64,
    },
}

#[derive(Debug, Clone)]
pub struct ScoreInput {
    pub student_email: String,
    pub assignment: AssignmentRef,
    pub submitted_at: DateTime<Utc>,
    pub grade: Option<f64>,
    pub source_key: Option<String>,
}

/// `RiskStore` over an open Postgres transaction.
pub struct PgRiskStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgRiskStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl RiskStore for PgRiskStore<'_> {
    async fn submission_history(
        &mut self,
        student_id: Uuid,
    ) -> anyhow::Result<Vec<SubmissionRecord>> {
        fetch_history(&mut *self.conn, student_id).await
    }

    async fn open_alerts(&mut self, student_id: Uuid) -> anyhow::Result<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, risk_score, reason, status, resolved_by, resolved_at, created_at
            FROM student_risk.alerts
            WHERE student_id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(student_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    async fn insert_alert(&mut self, alert: &Alert) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO student_risk.alerts
            (id, student_id, risk_score, reason, status, resolved_by, resolved_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(alert.student_id)
        .bind(alert.risk_score)
        .bind(&alert.reason)
        .bind(alert.status.as_str())
        .bind(alert.resolved_by)
        .bind(alert.resolved_at)
        .bind(alert.created_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}

async fn fetch_history(
    conn: &mut PgConnection,
    student_id: Uuid,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.submitted_at, s.grade, a.due_date, a.max_score
        FROM student_risk.submissions s
        JOIN student_risk.assignments a ON a.id = s.assignment_id
        WHERE s.student_id = $1
        "#,
    )
    .bind(student_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.iter().filter_map(record_from_row).collect())
}

fn record_from_row(row: &PgRow) -> Option<SubmissionRecord> {
    let id: Uuid = row.get("id");
    match SubmissionRecord::new(
        row.get("submitted_at"),
        row.get("grade"),
        row.get("due_date"),
        row.get("max_score"),
    ) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(submission_id = %id, error = %err, "skipping malformed submission");
            None
        }
    }
}

fn alert_from_row(row: &PgRow) -> anyhow::Result<Alert> {
    let status: String = row.get("status");
    Ok(Alert {
        id: row.get("id"),
        student_id: row.get("student_id"),
        risk_score: row.get("risk_score"),
        reason: row.get("reason"),
        status: status.parse()?,
        resolved_by: row.get("resolved_by"),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
    })
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        student_number: row.get("student_number"),
        name: row.get("full_name"),
        email: row.get("email"),
        enrollment_date: row.get("enrollment_date"),
    }
}

/// Records one submission and rescores the student in the same transaction.
///
/// Returns `None` when the row's `source_key` was already imported.
pub async fn add_score(
    pool: &PgPool,
    scorer: &RiskScorer,
    manager: &AlertManager,
    input: &ScoreInput,
) -> anyhow::Result<Option<RescoreOutcome>> {
    let mut tx = pool.begin().await?;

    let student_id: Uuid =
        sqlx::query("SELECT id FROM student_risk.students WHERE email = lower($1)")
            .bind(&input.student_email)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get("id"))
            .with_context(|| format!("student {} not found", input.student_email))?;

    // Serializes concurrent rescoring of the same student until commit.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(student_id.to_string())
        .execute(&mut *tx)
        .await?;

    let assignment = resolve_assignment(&mut tx, &input.assignment).await?;
    let submission = Submission {
        id: Uuid::new_v4(),
        student_id,
        assignment_id: assignment.id,
        submitted_at: input.submitted_at,
        grade: assignment.check_grade(input.grade)?,
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO student_risk.submissions
        (id, student_id, assignment_id, submitted_at, grade, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(submission.id)
    .bind(submission.student_id)
    .bind(submission.assignment_id)
    .bind(submission.submitted_at)
    .bind(submission.grade)
    .bind(&input.source_key)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        tx.commit().await?;
        return Ok(None);
    }

    let outcome = {
        let mut store = PgRiskStore::new(&mut tx);
        service::rescore_student(&mut store, scorer, manager, student_id).await?
    };
    tx.commit().await?;

    Ok(Some(outcome))
}

async fn resolve_assignment(
    conn: &mut PgConnection,
    assignment: &AssignmentRef,
) -> anyhow::Result<Assignment> {
    match assignment {
        AssignmentRef::Existing(id) => sqlx::query(
            "SELECT id, course_id, title, due_date, max_score FROM student_risk.assignments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| assignment_from_row(&row))
        .with_context(|| format!("assignment {id} not found")),
        AssignmentRef::New {
            course_code,
            title,
            due_date,
            max_score,
        } => {
            let course_id: Uuid =
                sqlx::query("SELECT id FROM student_risk.courses WHERE course_code = $1")
                    .bind(course_code)
                    .fetch_optional(&mut *conn)
                    .await?
                    .map(|row| row.get("id"))
                    .with_context(|| format!("course {course_code} not found"))?;

            let candidate = Assignment::new(course_id, title, *due_date, *max_score)?;
            let existing = sqlx::query(
                r#"
                SELECT id, course_id, title, due_date, max_score
                FROM student_risk.assignments
                WHERE course_id = $1 AND title = $2
                "#,
            )
            .bind(course_id)
            .bind(&candidate.title)
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(row) = existing {
                let stored = assignment_from_row(&row);
                if stored.differs_from(candidate.due_date, candidate.max_score) {
                    warn!(
                        assignment_id = %stored.id,
                        stored_due = %stored.due_date,
                        stored_max = stored.max_score,
                        given_due = %candidate.due_date,
                        given_max = candidate.max_score,
                        "reusing existing assignment; supplied due date or max score ignored"
                    );
                }
                return Ok(stored);
            }

            sqlx::query(
                r#"
                INSERT INTO student_risk.assignments (id, course_id, title, due_date, max_score)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(candidate.id)
            .bind(candidate.course_id)
            .bind(&candidate.title)
            .bind(candidate.due_date)
            .bind(candidate.max_score)
            .execute(&mut *conn)
            .await?;

            Ok(candidate)
        }
    }
}

fn assignment_from_row(row: &PgRow) -> Assignment {
    Assignment {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        due_date: row.get("due_date"),
        max_score: row.get("max_score"),
    }
}

/// Registers a student and enrolls them in the given courses.
pub async fn create_student(
    pool: &PgPool,
    student: &Student,
    course_codes: &[String],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO student_risk.students (id, student_number, full_name, email, enrollment_date)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(student.id)
    .bind(&student.student_number)
    .bind(&student.name)
    .bind(&student.email)
    .bind(student.enrollment_date)
    .execute(&mut *tx)
    .await;

    if let Err(sqlx::Error::Database(err)) = &result {
        if err.is_unique_violation() {
            bail!(
                "a student with this {} already exists",
                duplicate_student_field(err.constraint())
            );
        }
    }
    result?;

    for code in course_codes {
        let enrolled = sqlx::query(
            r#"
            INSERT INTO student_risk.enrollments (student_id, course_id)
            SELECT $1, id FROM student_risk.courses WHERE course_code = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(student.id)
        .bind(code)
        .execute(&mut *tx)
        .await?;
        if enrolled.rows_affected() == 0 {
            bail!("course {code} not found");
        }
    }

    tx.commit().await?;
    info!(student_id = %student.id, number = %student.student_number, "student registered");
    Ok(())
}

fn duplicate_student_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.contains("email") => "email",
        Some(name) if name.contains("student_number") => "student number",
        _ => "student number or email",
    }
}

pub async fn find_student(pool: &PgPool, email: &str) -> anyhow::Result<Student> {
    let row = sqlx::query(
        r#"
        SELECT id, student_number, full_name, email, enrollment_date
        FROM student_risk.students
        WHERE email = lower($1)
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("student {email} not found"))?;

    Ok(student_from_row(&row))
}

pub async fn student_history(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let mut conn = pool.acquire().await?;
    fetch_history(&mut conn, student_id).await
}

pub async fn student_alerts(pool: &PgPool, student_id: Uuid) -> anyhow::Result<Vec<Alert>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_id, risk_score, reason, status, resolved_by, resolved_at, created_at
        FROM student_risk.alerts
        WHERE student_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(alert_from_row).collect()
}

/// Every student with a freshly computed profile, highest score first.
pub async fn list_students(pool: &PgPool, scorer: &RiskScorer) -> anyhow::Result<Vec<StudentRisk>> {
    let students = sqlx::query(
        "SELECT id, student_number, full_name, email, enrollment_date FROM student_risk.students",
    )
    .fetch_all(pool)
    .await?;

    let submission_rows = sqlx::query(
        r#"
        SELECT s.id, s.student_id, s.submitted_at, s.grade, a.due_date, a.max_score
        FROM student_risk.submissions s
        JOIN student_risk.assignments a ON a.id = s.assignment_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut histories: HashMap<Uuid, Vec<SubmissionRecord>> = HashMap::new();
    for row in submission_rows.iter() {
        if let Some(record) = record_from_row(row) {
            histories
                .entry(row.get("student_id"))
                .or_default()
                .push(record);
        }
    }

    let open_counts: HashMap<Uuid, i64> = sqlx::query(
        r#"
        SELECT student_id, COUNT(*) AS open_alerts
        FROM student_risk.alerts
        WHERE status = 'OPEN'
        GROUP BY student_id
        "#,
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| (row.get("student_id"), row.get("open_alerts")))
    .collect();

    let mut values: Vec<StudentRisk> = students
        .iter()
        .map(|row| {
            let student = student_from_row(row);
            let history = histories.remove(&student.id).unwrap_or_default();
            let profile = scorer.compute_risk(&history);
            let stats = risk::submission_stats(&history);
            let open_alerts = open_counts.get(&student.id).copied().unwrap_or(0) as usize;
            StudentRisk {
                student,
                profile,
                average_grade: stats.average_grade,
                late_submissions: stats.late_submissions,
                open_alerts,
            }
        })
        .collect();

    values.sort_by(|a, b| {
        b.profile
            .score
            .partial_cmp(&a.profile.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student.name.cmp(&b.student.name))
    });
    Ok(values)
}

pub async fn list_courses(pool: &PgPool) -> anyhow::Result<Vec<Course>> {
    let rows = sqlx::query(
        "SELECT id, course_code, title FROM student_risk.courses ORDER BY title ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Course {
            id: row.get("id"),
            course_code: row.get("course_code"),
            title: row.get("title"),
        })
        .collect())
}

pub async fn list_open_alerts(pool: &PgPool) -> anyhow::Result<Vec<AlertWithStudent>> {
    let rows = sqlx::query(
        r#"
        SELECT al.id, al.student_id, al.risk_score, al.reason, al.status, al.resolved_by,
               al.resolved_at, al.created_at, st.full_name, st.email
        FROM student_risk.alerts al
        JOIN student_risk.students st ON st.id = al.student_id
        WHERE al.status = 'OPEN'
        ORDER BY al.risk_score DESC, al.created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut alerts = Vec::new();
    for row in rows.iter() {
        alerts.push(AlertWithStudent {
            alert: alert_from_row(row)?,
            student_name: row.get("full_name"),
            student_email: row.get("email"),
        });
    }
    Ok(alerts)
}

/// Applies a counselor's status change to a stored alert.
pub async fn update_alert_status(
    pool: &PgPool,
    alert_id: Uuid,
    status: &str,
    actor_id: Uuid,
) -> anyhow::Result<Alert> {
    let status: AlertStatus = status.parse()?;
    let mut tx = pool.begin().await?;

    let counselor = sqlx::query("SELECT id FROM student_risk.counselors WHERE id = $1")
        .bind(actor_id)
        .fetch_optional(&mut *tx)
        .await?;
    if counselor.is_none() {
        bail!("counselor {actor_id} not found");
    }

    let row = sqlx::query(
        r#"
        SELECT id, student_id, risk_score, reason, status, resolved_by, resolved_at, created_at
        FROM student_risk.alerts
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(alert_id)
    .fetch_optional(&mut *tx)
    .await?
    .with_context(|| format!("alert {alert_id} not found"))?;

    let mut alert = alert_from_row(&row)?;
    let previous = alert.status;
    alerts::transition(&mut alert, status, actor_id, Utc::now())?;

    sqlx::query(
        r#"
        UPDATE student_risk.alerts
        SET status = $2, resolved_by = $3, resolved_at = $4
        WHERE id = $1
        "#,
    )
    .bind(alert.id)
    .bind(alert.status.as_str())
    .bind(alert.resolved_by)
    .bind(alert.resolved_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(%alert_id, from = %previous, to = %alert.status, %actor_id, "alert status updated");
    Ok(alert)
}

pub async fn seed(
    pool: &PgPool,
    scorer: &RiskScorer,
    manager: &AlertManager,
) -> anyhow::Result<()> {
    let counselor_id = Uuid::parse_str(SEED_COUNSELOR_ID)?;
    sqlx::query(
        r#"
        INSERT INTO student_risk.counselors (id, name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(counselor_id)
    .bind("Dr. Eleanor Vance")
    .bind("counselor@university.edu")
    .execute(pool)
    .await?;

    let courses = vec![
        ("CS101", "Introduction to Computer Science"),
        ("MATH203", "Advanced Calculus"),
    ];
    for (code, title) in courses {
        sqlx::query(
            r#"
            INSERT INTO student_risk.courses (id, course_code, title)
            VALUES ($1, $2, $3)
            ON CONFLICT (course_code) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(title)
        .execute(pool)
        .await?;
    }

    let enrollment = NaiveDate::from_ymd_opt(2023, 9, 1).context("invalid date")?;
    let students = vec![
        (
            "S001",
            "Alice Johnson",
            "alice.j@university.edu",
            vec!["CS101", "MATH203"],
        ),
        ("S002", "Bob Williams", "bob.w@university.edu", vec!["CS101"]),
    ];
    for (number, name, email, enrolled_in) in students {
        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO student_risk.students (id, student_number, full_name, email, enrollment_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(number)
        .bind(name)
        .bind(email)
        .bind(enrollment)
        .fetch_one(pool)
        .await?
        .get("id");

        for code in enrolled_in {
            sqlx::query(
                r#"
                INSERT INTO student_risk.enrollments (student_id, course_id)
                SELECT $1, id FROM student_risk.courses WHERE course_code = $2
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(student_id)
            .bind(code)
            .execute(pool)
            .await?;
        }
    }

    let now = Utc::now();
    let midterm_due = now - Duration::days(10);
    let problem_set_due = now - Duration::days(15);
    let scores = vec![
        (
            "seed-001",
            "alice.j@university.edu",
            "MATH203",
            "MATH203 - Problem Set 1",
            problem_set_due,
            problem_set_due + Duration::days(1),
            75.0,
        ),
        (
            "seed-002",
            "alice.j@university.edu",
            "CS101",
            "CS101 - Midterm Project",
            midterm_due,
            midterm_due + Duration::days(5),
            58.0,
        ),
        (
            "seed-003",
            "bob.w@university.edu",
            "CS101",
            "CS101 - Midterm Project",
            midterm_due,
            midterm_due - Duration::days(1),
            92.0,
        ),
    ];

    for (source_key, email, course_code, title, due_date, submitted_at, grade) in scores {
        let input = ScoreInput {
            student_email: email.to_string(),
            assignment: AssignmentRef::New {
                course_code: course_code.to_string(),
                title: title.to_string(),
                due_date,
                max_score: 100.0,
            },
            submitted_at,
            grade: Some(grade),
            source_key: Some(source_key.to_string()),
        };
        add_score(pool, scorer, manager, &input).await?;
    }

    // Upcoming assignment with no submissions yet.
    sqlx::query(
        r#"
        INSERT INTO student_risk.assignments (id, course_id, title, due_date, max_score)
        SELECT $1, id, $2, $3, 100 FROM student_risk.courses WHERE course_code = 'CS101'
        ON CONFLICT (course_id, title) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind("CS101 - Final Essay")
    .bind(now + Duration::days(5))
    .execute(pool)
    .await?;

    // Manually raised alert; its reason does not block threshold alerts.
    sqlx::query(
        r#"
        INSERT INTO student_risk.alerts (id, student_id, risk_score, reason, status)
        SELECT $1, id, 0.78, $2, 'OPEN' FROM student_risk.students WHERE email = $3
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("a3c5e7f9-1b2d-4e6f-8a0c-3e5f7a9b1c2d")?)
    .bind("Significant drop in grades and increasing submission delays detected.")
    .bind("alice.j@university.edu")
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    scorer: &RiskScorer,
    manager: &AlertManager,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_email: String,
        course_code: String,
        assignment_title: String,
        due_date: DateTime<Utc>,
        max_score: f64,
        submitted_at: DateTime<Utc>,
        grade: Option<f64>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV row {}", index + 1))?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let input = ScoreInput {
            student_email: row.student_email,
            assignment: AssignmentRef::New {
                course_code: row.course_code,
                title: row.assignment_title,
                due_date: row.due_date,
                max_score: row.max_score,
            },
            submitted_at: row.submitted_at,
            grade: row.grade,
            source_key: Some(source_key),
        };

        let outcome = add_score(pool, scorer, manager, &input)
            .await
            .with_context(|| format!("failed to import CSV row {}", index + 1))?;
        if outcome.is_some() {
            inserted += 1;
        }
    }

    Ok(inserted)
}
