//! Roster and certification records.
//!
//! These are the rows the storage layer persists. Mutation rules:
//!
//! - `Student.current_belt` is written only by the promotion applier, via a
//!   conditional update in the store.
//! - `Exam` and `Enrollment` are immutable once created.
//! - `ExamResult` is write-once.
//! - `Certificate` is append-only; only its status/validation fields change,
//!   and only through the validation gate.

use crate::grade::LetterGrade;
use crate::id::{CertificateId, DojoId, EnrollmentId, ExamId, SenseiId, StudentId};
use crate::ladder::GradeLabel;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A karate school.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dojo {
    pub id: DojoId,
    pub name: String,
    pub city: String,
    pub created_at: DateTime<Utc>,
}

/// An instructor, affiliated with one dojo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensei {
    pub id: SenseiId,
    pub name: String,
    pub email: String,
    pub dojo_id: DojoId,
    pub created_at: DateTime<Utc>,
}

/// A student on a dojo's roster.
///
/// Students are never hard-deleted; `is_active = false` is the soft delete,
/// preserving referential integrity of past enrollments and certificates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub dojo_id: DojoId,
    pub current_belt: GradeLabel,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A graduation exam event. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub date: NaiveDate,
    /// The sensei who created and examines this event.
    pub sensei_id: SenseiId,
    pub organizing_dojo: DojoId,
    pub location_dojo: DojoId,
    pub observations: String,
    pub created_at: DateTime<Utc>,
}

/// One student's registration to attempt one grade at one exam.
///
/// At most one enrollment may exist per `(exam_id, student_id)` pair; the
/// storage layer enforces that. Never mutated, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub exam_id: ExamId,
    pub student_id: StudentId,
    /// The grade being attempted.
    pub belt: GradeLabel,
    pub created_at: DateTime<Utc>,
}

/// The graded outcome of one enrollment. Write-once.
///
/// Component grades may be absent when the student did not show up
/// (`present = false`); `final_grade` still determines approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamResult {
    pub enrollment_id: EnrollmentId,
    pub kata: Option<LetterGrade>,
    pub kumite: Option<LetterGrade>,
    pub kihon: Option<LetterGrade>,
    pub final_grade: LetterGrade,
    pub observations: String,
    pub present: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Validation state of a certificate.
///
/// `Valid` and `Revoked` are terminal; the storage layer rejects any further
/// transition out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Pending,
    Valid,
    Revoked,
}

impl CertificateStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CertificateStatus::Pending)
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Valid => "valid",
            CertificateStatus::Revoked => "revoked",
        };
        write!(f, "{label}")
    }
}

/// An issued certificate evidencing a promotion.
///
/// `issued_at` is assigned by the store when the row is inserted and is the
/// sole timestamp input to hash derivation, so retried issuance reproduces
/// the identical hash. `hash` and `pdf_url` stay `None` until the artifact
/// pipeline completes; a row in that state is "issued but unfinished" and
/// resumable by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub student_id: StudentId,
    pub exam_id: ExamId,
    pub belt: GradeLabel,
    pub status: CertificateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_by: Option<SenseiId>,
}

impl Certificate {
    /// True once both the hash and the artifact locator are recorded.
    pub fn issuance_complete(&self) -> bool {
        self.hash.is_some() && self.pdf_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_status_terminality() {
        assert!(!CertificateStatus::Pending.is_terminal());
        assert!(CertificateStatus::Valid.is_terminal());
        assert!(CertificateStatus::Revoked.is_terminal());
    }

    #[test]
    fn unfinished_certificates_are_detectable() {
        let cert = Certificate {
            id: CertificateId::new("certificate-1"),
            student_id: StudentId::new("student-1"),
            exam_id: ExamId::new("exam-1"),
            belt: GradeLabel::from("Cinturón Verde"),
            status: CertificateStatus::Pending,
            hash: Some("abc".to_string()),
            pdf_url: None,
            issued_at: Utc::now(),
            validated_at: None,
            validated_by: None,
        };
        assert!(!cert.issuance_complete());
    }
}
