//! PostgreSQL adapter for obi storage.
//!
//! The transactional source-of-truth backend. The uniqueness guarantees the
//! workflow relies on are carried by real constraints here: a UNIQUE index
//! on `(exam_id, student_id)` for enrollments, the enrollment id as primary
//! key for results, and guarded UPDATEs for belt changes and certificate
//! finalization.

use crate::traits::{
    CertificateStore, DojoStore, EnrollmentStore, ExamStore, NewCertificate, NewEnrollment,
    NewStudent, QueryWindow, ResultStore, SenseiStore, StudentStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use obi_types::{
    Certificate, CertificateId, CertificateStatus, Dojo, DojoId, Enrollment, EnrollmentId, Exam,
    ExamId, ExamResult, GradeLabel, LetterGrade, Sensei, SenseiId, Student, StudentId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;

/// PostgreSQL-backed obi storage adapter.
#[derive(Clone)]
pub struct PostgresDojoStorage {
    pool: PgPool,
}

impl PostgresDojoStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS obi_dojos (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                city TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS obi_senseis (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                dojo_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS obi_students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                dojo_id TEXT NOT NULL,
                current_belt TEXT NOT NULL,
                is_active BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS obi_exams (
                id TEXT PRIMARY KEY,
                date DATE NOT NULL,
                sensei_id TEXT NOT NULL,
                organizing_dojo TEXT NOT NULL,
                location_dojo TEXT NOT NULL,
                observations TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS obi_enrollments (
                id TEXT PRIMARY KEY,
                exam_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                belt TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (exam_id, student_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS obi_results (
                enrollment_id TEXT PRIMARY KEY,
                kata TEXT,
                kumite TEXT,
                kihon TEXT,
                final_grade TEXT NOT NULL,
                observations TEXT NOT NULL,
                present BOOLEAN NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS obi_certificates (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                exam_id TEXT NOT NULL,
                belt TEXT NOT NULL,
                status TEXT NOT NULL,
                hash TEXT,
                pdf_url TEXT,
                issued_at TIMESTAMPTZ NOT NULL,
                validated_at TIMESTAMPTZ,
                validated_by TEXT
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

fn map_sqlx_error(context: &str, error: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &error {
        if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return StorageError::Conflict(format!("{context}: {db}"));
        }
    }
    StorageError::Backend(format!("{context}: {error}"))
}

fn parse_grade(context: &str, value: &str) -> StorageResult<LetterGrade> {
    LetterGrade::from_str(value)
        .map_err(|e| StorageError::Serialization(format!("{context}: {e}")))
}

fn parse_optional_grade(context: &str, value: Option<String>) -> StorageResult<Option<LetterGrade>> {
    value.map(|v| parse_grade(context, &v)).transpose()
}

fn parse_status(value: &str) -> StorageResult<CertificateStatus> {
    match value {
        "pending" => Ok(CertificateStatus::Pending),
        "valid" => Ok(CertificateStatus::Valid),
        "revoked" => Ok(CertificateStatus::Revoked),
        other => Err(StorageError::Serialization(format!(
            "unknown certificate status '{other}'"
        ))),
    }
}

fn row_to_student(row: &PgRow) -> StorageResult<Student> {
    Ok(Student {
        id: StudentId::new(get_text(row, "id")?),
        name: get_text(row, "name")?,
        dojo_id: DojoId::new(get_text(row, "dojo_id")?),
        current_belt: GradeLabel::new(get_text(row, "current_belt")?),
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn row_to_enrollment(row: &PgRow) -> StorageResult<Enrollment> {
    Ok(Enrollment {
        id: EnrollmentId::new(get_text(row, "id")?),
        exam_id: ExamId::new(get_text(row, "exam_id")?),
        student_id: StudentId::new(get_text(row, "student_id")?),
        belt: GradeLabel::new(get_text(row, "belt")?),
        created_at: get(row, "created_at")?,
    })
}

fn row_to_result(row: &PgRow) -> StorageResult<ExamResult> {
    Ok(ExamResult {
        enrollment_id: EnrollmentId::new(get_text(row, "enrollment_id")?),
        kata: parse_optional_grade("kata", get(row, "kata")?)?,
        kumite: parse_optional_grade("kumite", get(row, "kumite")?)?,
        kihon: parse_optional_grade("kihon", get(row, "kihon")?)?,
        final_grade: parse_grade("final_grade", &get_text(row, "final_grade")?)?,
        observations: get_text(row, "observations")?,
        present: get(row, "present")?,
        recorded_at: get(row, "recorded_at")?,
    })
}

fn row_to_certificate(row: &PgRow) -> StorageResult<Certificate> {
    let validated_by: Option<String> = get(row, "validated_by")?;
    Ok(Certificate {
        id: CertificateId::new(get_text(row, "id")?),
        student_id: StudentId::new(get_text(row, "student_id")?),
        exam_id: ExamId::new(get_text(row, "exam_id")?),
        belt: GradeLabel::new(get_text(row, "belt")?),
        status: parse_status(&get_text(row, "status")?)?,
        hash: get(row, "hash")?,
        pdf_url: get(row, "pdf_url")?,
        issued_at: get(row, "issued_at")?,
        validated_at: get(row, "validated_at")?,
        validated_by: validated_by.map(SenseiId::new),
    })
}

fn row_to_exam(row: &PgRow) -> StorageResult<Exam> {
    Ok(Exam {
        id: ExamId::new(get_text(row, "id")?),
        date: get(row, "date")?,
        sensei_id: SenseiId::new(get_text(row, "sensei_id")?),
        organizing_dojo: DojoId::new(get_text(row, "organizing_dojo")?),
        location_dojo: DojoId::new(get_text(row, "location_dojo")?),
        observations: get_text(row, "observations")?,
        created_at: get(row, "created_at")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Serialization(format!("column {column}: {e}")))
}

fn get_text(row: &PgRow, column: &str) -> StorageResult<String> {
    get::<String>(row, column)
}

fn window_clause(window: QueryWindow) -> (i64, i64) {
    let limit = if window.limit == 0 {
        i64::MAX
    } else {
        window.limit as i64
    };
    (limit, window.offset as i64)
}

#[async_trait]
impl DojoStore for PostgresDojoStorage {
    async fn insert_dojo(&self, dojo: Dojo) -> StorageResult<()> {
        sqlx::query("INSERT INTO obi_dojos (id, name, city, created_at) VALUES ($1, $2, $3, $4)")
            .bind(dojo.id.as_str())
            .bind(&dojo.name)
            .bind(&dojo.city)
            .bind(dojo.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert dojo", e))?;
        Ok(())
    }

    async fn get_dojo(&self, id: &DojoId) -> StorageResult<Option<Dojo>> {
        let row = sqlx::query("SELECT id, name, city, created_at FROM obi_dojos WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get dojo", e))?;
        row.map(|r| {
            Ok(Dojo {
                id: DojoId::new(get_text(&r, "id")?),
                name: get_text(&r, "name")?,
                city: get_text(&r, "city")?,
                created_at: get(&r, "created_at")?,
            })
        })
        .transpose()
    }

    async fn list_dojos(&self, window: QueryWindow) -> StorageResult<Vec<Dojo>> {
        let (limit, offset) = window_clause(window);
        let rows = sqlx::query(
            "SELECT id, name, city, created_at FROM obi_dojos ORDER BY name LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list dojos", e))?;
        rows.iter()
            .map(|r| {
                Ok(Dojo {
                    id: DojoId::new(get_text(r, "id")?),
                    name: get_text(r, "name")?,
                    city: get_text(r, "city")?,
                    created_at: get(r, "created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SenseiStore for PostgresDojoStorage {
    async fn insert_sensei(&self, sensei: Sensei) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO obi_senseis (id, name, email, dojo_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(sensei.id.as_str())
        .bind(&sensei.name)
        .bind(&sensei.email)
        .bind(sensei.dojo_id.as_str())
        .bind(sensei.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert sensei", e))?;
        Ok(())
    }

    async fn get_sensei(&self, id: &SenseiId) -> StorageResult<Option<Sensei>> {
        let row = sqlx::query(
            "SELECT id, name, email, dojo_id, created_at FROM obi_senseis WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get sensei", e))?;
        row.map(|r| {
            Ok(Sensei {
                id: SenseiId::new(get_text(&r, "id")?),
                name: get_text(&r, "name")?,
                email: get_text(&r, "email")?,
                dojo_id: DojoId::new(get_text(&r, "dojo_id")?),
                created_at: get(&r, "created_at")?,
            })
        })
        .transpose()
    }

    async fn list_senseis(&self, window: QueryWindow) -> StorageResult<Vec<Sensei>> {
        let (limit, offset) = window_clause(window);
        let rows = sqlx::query(
            "SELECT id, name, email, dojo_id, created_at FROM obi_senseis ORDER BY name LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list senseis", e))?;
        rows.iter()
            .map(|r| {
                Ok(Sensei {
                    id: SenseiId::new(get_text(r, "id")?),
                    name: get_text(r, "name")?,
                    email: get_text(r, "email")?,
                    dojo_id: DojoId::new(get_text(r, "dojo_id")?),
                    created_at: get(r, "created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StudentStore for PostgresDojoStorage {
    async fn insert_student(&self, student: NewStudent) -> StorageResult<Student> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO obi_students (id, name, dojo_id, current_belt, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            RETURNING id, name, dojo_id, current_belt, is_active, created_at, updated_at
            "#,
        )
        .bind(student.id.as_str())
        .bind(&student.name)
        .bind(student.dojo_id.as_str())
        .bind(student.current_belt.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert student", e))?;
        row_to_student(&row)
    }

    async fn get_student(&self, id: &StudentId) -> StorageResult<Option<Student>> {
        let row = sqlx::query(
            "SELECT id, name, dojo_id, current_belt, is_active, created_at, updated_at FROM obi_students WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get student", e))?;
        row.as_ref().map(row_to_student).transpose()
    }

    async fn update_student_belt(
        &self,
        id: &StudentId,
        expected_belt: &GradeLabel,
        new_belt: &GradeLabel,
    ) -> StorageResult<Student> {
        let row = sqlx::query(
            r#"
            UPDATE obi_students
            SET current_belt = $3, updated_at = $4
            WHERE id = $1 AND current_belt = $2
            RETURNING id, name, dojo_id, current_belt, is_active, created_at, updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(expected_belt.as_str())
        .bind(new_belt.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update student belt", e))?;

        match row {
            Some(row) => row_to_student(&row),
            None => {
                // Distinguish a missing student from a stale expected belt.
                if self.get_student(id).await?.is_none() {
                    Err(StorageError::NotFound(format!("student {id} not found")))
                } else {
                    Err(StorageError::Conflict(format!(
                        "student {id} belt changed concurrently"
                    )))
                }
            }
        }
    }

    async fn set_student_active(&self, id: &StudentId, is_active: bool) -> StorageResult<Student> {
        let row = sqlx::query(
            r#"
            UPDATE obi_students
            SET is_active = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, name, dojo_id, current_belt, is_active, created_at, updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(is_active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set student active", e))?;
        match row {
            Some(row) => row_to_student(&row),
            None => Err(StorageError::NotFound(format!("student {id} not found"))),
        }
    }

    async fn list_students(
        &self,
        dojo: &DojoId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Student>> {
        let (limit, offset) = window_clause(window);
        let rows = sqlx::query(
            r#"
            SELECT id, name, dojo_id, current_belt, is_active, created_at, updated_at
            FROM obi_students WHERE dojo_id = $1 ORDER BY name LIMIT $2 OFFSET $3
            "#,
        )
        .bind(dojo.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list students", e))?;
        rows.iter().map(row_to_student).collect()
    }
}

#[async_trait]
impl ExamStore for PostgresDojoStorage {
    async fn insert_exam(&self, exam: Exam) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO obi_exams (id, date, sensei_id, organizing_dojo, location_dojo, observations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(exam.id.as_str())
        .bind(exam.date)
        .bind(exam.sensei_id.as_str())
        .bind(exam.organizing_dojo.as_str())
        .bind(exam.location_dojo.as_str())
        .bind(&exam.observations)
        .bind(exam.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert exam", e))?;
        Ok(())
    }

    async fn get_exam(&self, id: &ExamId) -> StorageResult<Option<Exam>> {
        let row = sqlx::query(
            "SELECT id, date, sensei_id, organizing_dojo, location_dojo, observations, created_at FROM obi_exams WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get exam", e))?;
        row.as_ref().map(row_to_exam).transpose()
    }

    async fn list_exams_on(&self, date: NaiveDate) -> StorageResult<Vec<Exam>> {
        let rows = sqlx::query(
            "SELECT id, date, sensei_id, organizing_dojo, location_dojo, observations, created_at FROM obi_exams WHERE date = $1 ORDER BY id",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list exams on date", e))?;
        rows.iter().map(row_to_exam).collect()
    }

    async fn list_exams(&self, window: QueryWindow) -> StorageResult<Vec<Exam>> {
        let (limit, offset) = window_clause(window);
        let rows = sqlx::query(
            "SELECT id, date, sensei_id, organizing_dojo, location_dojo, observations, created_at FROM obi_exams ORDER BY date DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list exams", e))?;
        rows.iter().map(row_to_exam).collect()
    }
}

#[async_trait]
impl EnrollmentStore for PostgresDojoStorage {
    async fn insert_enrollment(&self, enrollment: NewEnrollment) -> StorageResult<Enrollment> {
        let row = sqlx::query(
            r#"
            INSERT INTO obi_enrollments (id, exam_id, student_id, belt, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, exam_id, student_id, belt, created_at
            "#,
        )
        .bind(enrollment.id.as_str())
        .bind(enrollment.exam_id.as_str())
        .bind(enrollment.student_id.as_str())
        .bind(enrollment.belt.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert enrollment", e))?;
        row_to_enrollment(&row)
    }

    async fn get_enrollment(&self, id: &EnrollmentId) -> StorageResult<Option<Enrollment>> {
        let row = sqlx::query(
            "SELECT id, exam_id, student_id, belt, created_at FROM obi_enrollments WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get enrollment", e))?;
        row.as_ref().map(row_to_enrollment).transpose()
    }

    async fn find_enrollment(
        &self,
        exam_id: &ExamId,
        student_id: &StudentId,
    ) -> StorageResult<Option<Enrollment>> {
        let row = sqlx::query(
            "SELECT id, exam_id, student_id, belt, created_at FROM obi_enrollments WHERE exam_id = $1 AND student_id = $2",
        )
        .bind(exam_id.as_str())
        .bind(student_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find enrollment", e))?;
        row.as_ref().map(row_to_enrollment).transpose()
    }

    async fn list_enrollments_for_exam(&self, exam_id: &ExamId) -> StorageResult<Vec<Enrollment>> {
        let rows = sqlx::query(
            "SELECT id, exam_id, student_id, belt, created_at FROM obi_enrollments WHERE exam_id = $1 ORDER BY created_at",
        )
        .bind(exam_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list enrollments for exam", e))?;
        rows.iter().map(row_to_enrollment).collect()
    }

    async fn list_enrollments_for_student(
        &self,
        student_id: &StudentId,
    ) -> StorageResult<Vec<Enrollment>> {
        let rows = sqlx::query(
            "SELECT id, exam_id, student_id, belt, created_at FROM obi_enrollments WHERE student_id = $1 ORDER BY created_at",
        )
        .bind(student_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list enrollments for student", e))?;
        rows.iter().map(row_to_enrollment).collect()
    }
}

#[async_trait]
impl ResultStore for PostgresDojoStorage {
    async fn insert_result(&self, result: ExamResult) -> StorageResult<ExamResult> {
        let row = sqlx::query(
            r#"
            INSERT INTO obi_results (enrollment_id, kata, kumite, kihon, final_grade, observations, present, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING enrollment_id, kata, kumite, kihon, final_grade, observations, present, recorded_at
            "#,
        )
        .bind(result.enrollment_id.as_str())
        .bind(result.kata.map(|g| g.as_str()))
        .bind(result.kumite.map(|g| g.as_str()))
        .bind(result.kihon.map(|g| g.as_str()))
        .bind(result.final_grade.as_str())
        .bind(&result.observations)
        .bind(result.present)
        .bind(result.recorded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert result", e))?;
        row_to_result(&row)
    }

    async fn get_result(&self, enrollment_id: &EnrollmentId) -> StorageResult<Option<ExamResult>> {
        let row = sqlx::query(
            "SELECT enrollment_id, kata, kumite, kihon, final_grade, observations, present, recorded_at FROM obi_results WHERE enrollment_id = $1",
        )
        .bind(enrollment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get result", e))?;
        row.as_ref().map(row_to_result).transpose()
    }
}

#[async_trait]
impl CertificateStore for PostgresDojoStorage {
    async fn insert_certificate(&self, certificate: NewCertificate) -> StorageResult<Certificate> {
        let row = sqlx::query(
            r#"
            INSERT INTO obi_certificates (id, student_id, exam_id, belt, status, hash, pdf_url, issued_at, validated_at, validated_by)
            VALUES ($1, $2, $3, $4, 'pending', NULL, NULL, NOW(), NULL, NULL)
            RETURNING id, student_id, exam_id, belt, status, hash, pdf_url, issued_at, validated_at, validated_by
            "#,
        )
        .bind(certificate.id.as_str())
        .bind(certificate.student_id.as_str())
        .bind(certificate.exam_id.as_str())
        .bind(certificate.belt.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert certificate", e))?;
        row_to_certificate(&row)
    }

    async fn get_certificate(&self, id: &CertificateId) -> StorageResult<Option<Certificate>> {
        let row = sqlx::query(
            "SELECT id, student_id, exam_id, belt, status, hash, pdf_url, issued_at, validated_at, validated_by FROM obi_certificates WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get certificate", e))?;
        row.as_ref().map(row_to_certificate).transpose()
    }

    async fn complete_issuance(
        &self,
        id: &CertificateId,
        hash: &str,
        pdf_url: &str,
    ) -> StorageResult<Certificate> {
        let row = sqlx::query(
            r#"
            UPDATE obi_certificates
            SET hash = $2, pdf_url = $3
            WHERE id = $1 AND hash IS NULL AND pdf_url IS NULL
            RETURNING id, student_id, exam_id, belt, status, hash, pdf_url, issued_at, validated_at, validated_by
            "#,
        )
        .bind(id.as_str())
        .bind(hash)
        .bind(pdf_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete issuance", e))?;

        if let Some(row) = row {
            return row_to_certificate(&row);
        }

        // Guarded update matched nothing: the row is missing, or issuance
        // was already completed. Identical completion is an idempotent
        // resume; anything else is a conflict.
        let existing = self
            .get_certificate(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("certificate {id} not found")))?;
        if existing.hash.as_deref() == Some(hash) && existing.pdf_url.as_deref() == Some(pdf_url) {
            Ok(existing)
        } else {
            Err(StorageError::Conflict(format!(
                "certificate {id} issuance already completed with different values"
            )))
        }
    }

    async fn finalize_certificate(
        &self,
        id: &CertificateId,
        status: CertificateStatus,
        validated_by: &SenseiId,
        validated_at: DateTime<Utc>,
    ) -> StorageResult<Certificate> {
        if !status.is_terminal() {
            return Err(StorageError::InvalidInput(
                "finalize_certificate requires a terminal status".to_string(),
            ));
        }
        let row = sqlx::query(
            r#"
            UPDATE obi_certificates
            SET status = $2, validated_at = $3, validated_by = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING id, student_id, exam_id, belt, status, hash, pdf_url, issued_at, validated_at, validated_by
            "#,
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(validated_at)
        .bind(validated_by.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("finalize certificate", e))?;

        match row {
            Some(row) => row_to_certificate(&row),
            None => {
                let existing = self
                    .get_certificate(id)
                    .await?
                    .ok_or_else(|| StorageError::NotFound(format!("certificate {id} not found")))?;
                Err(StorageError::Conflict(format!(
                    "certificate {id} is already {}",
                    existing.status
                )))
            }
        }
    }

    async fn list_certificates_for_student(
        &self,
        student_id: &StudentId,
    ) -> StorageResult<Vec<Certificate>> {
        let rows = sqlx::query(
            "SELECT id, student_id, exam_id, belt, status, hash, pdf_url, issued_at, validated_at, validated_by FROM obi_certificates WHERE student_id = $1 ORDER BY issued_at",
        )
        .bind(student_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list certificates for student", e))?;
        rows.iter().map(row_to_certificate).collect()
    }
}
