use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use obi_types::{
    Certificate, CertificateId, CertificateStatus, Dojo, DojoId, Enrollment, EnrollmentId, Exam,
    ExamId, ExamResult, GradeLabel, Sensei, SenseiId, Student, StudentId,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Fields for a new student row. The store assigns timestamps.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub id: StudentId,
    pub name: String,
    pub dojo_id: DojoId,
    pub current_belt: GradeLabel,
}

/// Fields for a new enrollment row. The store assigns `created_at`.
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub id: EnrollmentId,
    pub exam_id: ExamId,
    pub student_id: StudentId,
    pub belt: GradeLabel,
}

/// Fields for a new certificate row.
///
/// `issued_at` is deliberately absent: the store assigns it at insert time
/// and it is immutable thereafter, which keeps hash derivation stable across
/// retried issuance.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub id: CertificateId,
    pub student_id: StudentId,
    pub exam_id: ExamId,
    pub belt: GradeLabel,
}

/// Storage interface for dojo reference data.
#[async_trait]
pub trait DojoStore: Send + Sync {
    async fn insert_dojo(&self, dojo: Dojo) -> StorageResult<()>;
    async fn get_dojo(&self, id: &DojoId) -> StorageResult<Option<Dojo>>;
    async fn list_dojos(&self, window: QueryWindow) -> StorageResult<Vec<Dojo>>;
}

/// Storage interface for sensei reference data.
#[async_trait]
pub trait SenseiStore: Send + Sync {
    async fn insert_sensei(&self, sensei: Sensei) -> StorageResult<()>;
    async fn get_sensei(&self, id: &SenseiId) -> StorageResult<Option<Sensei>>;
    async fn list_senseis(&self, window: QueryWindow) -> StorageResult<Vec<Sensei>>;
}

/// Storage interface for the student roster.
#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn insert_student(&self, student: NewStudent) -> StorageResult<Student>;

    async fn get_student(&self, id: &StudentId) -> StorageResult<Option<Student>>;

    /// Conditional belt update: succeeds only while the stored belt still
    /// equals `expected_belt`. A mismatch returns `Conflict`, signalling a
    /// concurrent promotion the caller must re-read and re-evaluate.
    async fn update_student_belt(
        &self,
        id: &StudentId,
        expected_belt: &GradeLabel,
        new_belt: &GradeLabel,
    ) -> StorageResult<Student>;

    /// Soft delete / reactivation. Rows are never removed.
    async fn set_student_active(&self, id: &StudentId, is_active: bool) -> StorageResult<Student>;

    async fn list_students(&self, dojo: &DojoId, window: QueryWindow)
        -> StorageResult<Vec<Student>>;
}

/// Storage interface for exam events. Exams are immutable once inserted.
#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn insert_exam(&self, exam: Exam) -> StorageResult<()>;
    async fn get_exam(&self, id: &ExamId) -> StorageResult<Option<Exam>>;
    async fn list_exams_on(&self, date: NaiveDate) -> StorageResult<Vec<Exam>>;
    async fn list_exams(&self, window: QueryWindow) -> StorageResult<Vec<Exam>>;
}

/// Storage interface for enrollments.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert an enrollment. At most one row may exist per
    /// `(exam_id, student_id)`; a second insert returns `Conflict`.
    async fn insert_enrollment(&self, enrollment: NewEnrollment) -> StorageResult<Enrollment>;

    async fn get_enrollment(&self, id: &EnrollmentId) -> StorageResult<Option<Enrollment>>;

    async fn find_enrollment(
        &self,
        exam_id: &ExamId,
        student_id: &StudentId,
    ) -> StorageResult<Option<Enrollment>>;

    async fn list_enrollments_for_exam(&self, exam_id: &ExamId) -> StorageResult<Vec<Enrollment>>;

    async fn list_enrollments_for_student(
        &self,
        student_id: &StudentId,
    ) -> StorageResult<Vec<Enrollment>>;
}

/// Storage interface for write-once exam results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert the result for an enrollment. Exactly one row may exist per
    /// enrollment; a second insert returns `Conflict`.
    async fn insert_result(&self, result: ExamResult) -> StorageResult<ExamResult>;

    async fn get_result(&self, enrollment_id: &EnrollmentId) -> StorageResult<Option<ExamResult>>;
}

/// Storage interface for certificates.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Insert a pending certificate row, assigning the authoritative
    /// `issued_at` server-side. The returned row carries that timestamp.
    async fn insert_certificate(&self, certificate: NewCertificate) -> StorageResult<Certificate>;

    async fn get_certificate(&self, id: &CertificateId) -> StorageResult<Option<Certificate>>;

    /// Record the derived hash and artifact locator, exactly once. A second
    /// completion attempt with different values returns `Conflict`; repeating
    /// the identical completion is accepted (idempotent resume).
    async fn complete_issuance(
        &self,
        id: &CertificateId,
        hash: &str,
        pdf_url: &str,
    ) -> StorageResult<Certificate>;

    /// Transition pending -> `status` (Valid or Revoked), setting
    /// `validated_at`/`validated_by` atomically with the flag. Returns
    /// `Conflict` when the certificate is already in a terminal state.
    async fn finalize_certificate(
        &self,
        id: &CertificateId,
        status: CertificateStatus,
        validated_by: &SenseiId,
        validated_at: DateTime<Utc>,
    ) -> StorageResult<Certificate>;

    async fn list_certificates_for_student(
        &self,
        student_id: &StudentId,
    ) -> StorageResult<Vec<Certificate>>;
}

/// Unified storage bundle used by the workflow and runtime crates.
pub trait DojoStorage:
    DojoStore
    + SenseiStore
    + StudentStore
    + ExamStore
    + EnrollmentStore
    + ResultStore
    + CertificateStore
    + Send
    + Sync
{
}

impl<T> DojoStorage for T where
    T: DojoStore
        + SenseiStore
        + StudentStore
        + ExamStore
        + EnrollmentStore
        + ResultStore
        + CertificateStore
        + Send
        + Sync
{
}
