use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::blob;
use crate::error::{Error, Result};
use crate::models::{
    NewViolation, Student, StudentStats, StudentStatus, StudentWithViolations, Violation,
    ViolationFilter, ViolationStats, ViolationStatus,
};
use crate::stats;
use crate::store::{attach_violations, BlobStore, StudentStore, ViolationStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            nim TEXT NOT NULL UNIQUE,
            program TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            address TEXT,
            enrollment_year INT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS violations (
            id UUID PRIMARY KEY,
            student_name TEXT NOT NULL,
            student_id TEXT NOT NULL,
            violation_type TEXT NOT NULL,
            description TEXT NOT NULL,
            location TEXT NOT NULL,
            image_url TEXT,
            reported_by TEXT NOT NULL,
            reported_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            status TEXT NOT NULL DEFAULT 'pending'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS violations_reported_at_idx ON violations (reported_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS violations_student_id_idx ON violations (student_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("Ahmad Rizki Pratama", "210441100001", "Teknik Informatika", "ahmad.rizki@student.um.ac.id", "081234567890", 2021),
        ("Siti Nurhaliza", "210441100002", "Teknik Elektro", "siti.nurhaliza@student.um.ac.id", "081234567891", 2021),
        ("Budi Santoso", "210441100003", "Teknik Informatika", "budi.santoso@student.um.ac.id", "081234567892", 2021),
        ("Dewi Sartika", "210441100004", "Teknik Elektro", "dewi.sartika@student.um.ac.id", "081234567893", 2021),
        ("Andi Wijaya", "210441100005", "Teknik Informatika", "andi.wijaya@student.um.ac.id", "081234567894", 2021),
    ];

    for (name, nim, program, email, phone, year) in students {
        sqlx::query(
            r#"
            INSERT INTO students (id, name, nim, program, email, phone, enrollment_year, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            ON CONFLICT (nim) DO UPDATE
            SET name = EXCLUDED.name, program = EXCLUDED.program, email = EXCLUDED.email
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(nim)
        .bind(program)
        .bind(email)
        .bind(phone)
        .bind(year)
        .execute(pool)
        .await?;
    }

    let violations = vec![
        (
            Uuid::parse_str("6f1c9a52-40d4-4f0e-9c3b-8d2a1e5b7c01")?,
            "Ahmad Rizki Pratama",
            "210441100001",
            "Late to Class",
            "Arrived 40 minutes into the morning lecture",
            "Building A, Room 203",
            "pending",
        ),
        (
            Uuid::parse_str("2b8e7d13-5a96-4c2f-b1d4-90f3c6a8e502")?,
            "Siti Nurhaliza",
            "210441100002",
            "Uniform Violation",
            "Not wearing the required lab coat during practicum",
            "Electronics Lab",
            "investigating",
        ),
        (
            Uuid::parse_str("c4d2f081-7e35-49ab-a6c8-31b59d0e2f03")?,
            "Budi Santoso",
            "210441100003",
            "Smoking on Campus",
            "Smoking behind the library",
            "Library courtyard",
            "resolved",
        ),
    ];

    for (id, student_name, student_id, violation_type, description, location, status) in violations
    {
        sqlx::query(
            r#"
            INSERT INTO violations
            (id, student_name, student_id, violation_type, description, location, reported_by, reported_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now(), $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(student_name)
        .bind(student_id)
        .bind(violation_type)
        .bind(description)
        .bind(location)
        .bind("disciplinary.office@um.ac.id")
        .bind(status)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Upsert students from a CSV export, keyed on the institutional number.
pub async fn import_students_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        nim: String,
        program: String,
        email: Option<String>,
        phone: Option<String>,
        address: Option<String>,
        enrollment_year: i32,
        status: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status: StudentStatus = row
            .status
            .as_deref()
            .unwrap_or("active")
            .parse()
            .map_err(|e: Error| anyhow::anyhow!("row for nim {}: {e}", row.nim))?;

        sqlx::query(
            r#"
            INSERT INTO students
            (id, name, nim, program, email, phone, address, enrollment_year, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (nim) DO UPDATE
            SET name = EXCLUDED.name,
                program = EXCLUDED.program,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                enrollment_year = EXCLUDED.enrollment_year,
                status = EXCLUDED.status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.name)
        .bind(&row.nim)
        .bind(&row.program)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.address)
        .bind(row.enrollment_year)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        imported += 1;
    }

    Ok(imported)
}

fn violation_from_row(row: &PgRow) -> Result<Violation> {
    let status: String = row.get("status");
    Ok(Violation {
        id: row.get("id"),
        student_name: row.get("student_name"),
        student_id: row.get("student_id"),
        violation_type: row.get("violation_type"),
        description: row.get("description"),
        location: row.get("location"),
        image_url: row.get("image_url"),
        reported_by: row.get("reported_by"),
        reported_at: row.get("reported_at"),
        status: status.parse()?,
    })
}

fn student_from_row(row: &PgRow) -> Result<Student> {
    let status: String = row.get("status");
    Ok(Student {
        id: row.get("id"),
        name: row.get("name"),
        nim: row.get("nim"),
        program: row.get("program"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        enrollment_year: row.get("enrollment_year"),
        status: status.parse()?,
        created_at: row.get("created_at"),
    })
}

const VIOLATION_COLUMNS: &str = "id, student_name, student_id, violation_type, description, \
     location, image_url, reported_by, reported_at, status";

const STUDENT_COLUMNS: &str =
    "id, name, nim, program, email, phone, address, enrollment_year, status, created_at";

/// Violation store backed by the hosted Postgres instance.
pub struct PgViolationStore {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
}

impl PgViolationStore {
    pub fn new(pool: PgPool, blobs: Arc<dyn BlobStore>) -> Self {
        Self { pool, blobs }
    }
}

#[async_trait]
impl ViolationStore for PgViolationStore {
    async fn add(&self, input: &NewViolation, image: Option<&[u8]>) -> Result<Uuid> {
        input.validate()?;

        // Upload first. The record only exists once the blob does, so a
        // stored record never carries a dangling image reference.
        let image_url = match image {
            Some(bytes) => Some(self.blobs.put(&blob::image_key(), bytes).await?),
            None => None,
        };

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO violations
            (id, student_name, student_id, violation_type, description, location, image_url, reported_by, reported_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), 'pending')
            "#,
        )
        .bind(id)
        .bind(&input.student_name)
        .bind(&input.student_id)
        .bind(&input.violation_type)
        .bind(&input.description)
        .bind(&input.location)
        .bind(&image_url)
        .bind(&input.reported_by)
        .execute(&self.pool)
        .await?;

        debug!(%id, student_id = %input.student_id, "violation recorded");
        Ok(id)
    }

    async fn query(&self, filter: &ViolationFilter) -> Result<Vec<Violation>> {
        let mut sql = format!("SELECT {VIOLATION_COLUMNS} FROM violations");

        let mut conditions = Vec::new();
        if filter.student_id.is_some() {
            conditions.push(format!("student_id = ${}", conditions.len() + 1));
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${}", conditions.len() + 1));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY reported_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(student_id) = &filter.student_id {
            query = query.bind(student_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut violations = Vec::with_capacity(rows.len());
        for row in &rows {
            violations.push(violation_from_row(row)?);
        }

        Ok(stats::apply_date_range(violations, filter))
    }

    async fn stats(&self) -> Result<ViolationStats> {
        let all = self.query(&ViolationFilter::default()).await?;
        Ok(stats::violation_stats(&all, today()))
    }

    async fn update_status(&self, id: Uuid, status: ViolationStatus) -> Result<()> {
        let row = sqlx::query("SELECT status FROM violations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::query(format!("violation {id} not found")))?;

        let current: ViolationStatus = row.get::<String, _>("status").parse()?;
        if !current.can_transition_to(status) {
            return Err(Error::validation(format!(
                "cannot move violation from {current} to {status}"
            )));
        }

        sqlx::query("UPDATE violations SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Student store backed by the hosted Postgres instance. Violation counts
/// come from the injected violation store.
pub struct PgStudentStore {
    pool: PgPool,
    violations: Arc<dyn ViolationStore>,
}

impl PgStudentStore {
    pub fn new(pool: PgPool, violations: Arc<dyn ViolationStore>) -> Self {
        Self { pool, violations }
    }
}

#[async_trait]
impl StudentStore for PgStudentStore {
    async fn search(&self, query: &str) -> Result<Vec<StudentWithViolations>> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students \
             WHERE name ILIKE $1 OR program ILIKE $1 OR nim LIKE $1"
        ))
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        let mut students = Vec::with_capacity(rows.len());
        for row in &rows {
            students.push(student_from_row(row)?);
        }

        Ok(attach_violations(self.violations.as_ref(), students).await)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Student>> {
        let row = sqlx::query(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id::text = $1 OR nim = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(student_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut students = Vec::with_capacity(rows.len());
        for row in &rows {
            students.push(student_from_row(row)?);
        }
        Ok(students)
    }

    async fn stats(&self) -> Result<StudentStats> {
        let students = self.list_all().await?;
        Ok(stats::student_stats(&students))
    }
}

fn today() -> NaiveDate {
    stats::local_day(Utc::now())
}
