//! Result recorder: writes the graded outcome of one enrollment, exactly once.

use crate::error::WorkflowError;
use chrono::Utc;
use obi_storage::DojoStorage;
use obi_types::{EnrollmentId, ExamResult, LetterGrade};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// The grading form a sensei submits for one enrollment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSheet {
    pub kata: Option<LetterGrade>,
    pub kumite: Option<LetterGrade>,
    pub kihon: Option<LetterGrade>,
    pub final_grade: LetterGrade,
    #[serde(default)]
    pub observations: String,
    pub present: bool,
}

impl ResultSheet {
    /// Parse a sheet from raw string fields, rejecting anything outside the
    /// fixed ordinal grade set. This is the entry point for untyped input
    /// (forms, CLI flags); typed construction cannot carry invalid grades.
    pub fn parse(
        kata: Option<&str>,
        kumite: Option<&str>,
        kihon: Option<&str>,
        final_grade: &str,
        observations: impl Into<String>,
        present: bool,
    ) -> Result<Self, WorkflowError> {
        let parse_component = |value: Option<&str>| -> Result<Option<LetterGrade>, WorkflowError> {
            value
                .map(|v| LetterGrade::from_str(v).map_err(WorkflowError::from))
                .transpose()
        };
        Ok(Self {
            kata: parse_component(kata)?,
            kumite: parse_component(kumite)?,
            kihon: parse_component(kihon)?,
            final_grade: LetterGrade::from_str(final_grade)?,
            observations: observations.into(),
            present,
        })
    }
}

/// Records exam results. The write-once guarantee is enforced by the
/// storage layer's uniqueness constraint on the enrollment id, so two
/// concurrent submissions cannot both succeed.
pub struct ResultRecorder {
    storage: Arc<dyn DojoStorage>,
}

impl ResultRecorder {
    pub fn new(storage: Arc<dyn DojoStorage>) -> Self {
        Self { storage }
    }

    /// Record the result for `enrollment_id`.
    ///
    /// Returns the stored result. Triggers no promotion: promotion is a
    /// separate explicit step chained by the caller, keeping grading and
    /// promotion independently testable and auditable.
    pub async fn record_result(
        &self,
        enrollment_id: &EnrollmentId,
        sheet: ResultSheet,
    ) -> Result<ExamResult, WorkflowError> {
        let enrollment = self
            .storage
            .get_enrollment(enrollment_id)
            .await?
            .ok_or_else(|| WorkflowError::EnrollmentNotFound(enrollment_id.to_string()))?;

        let result = ExamResult {
            enrollment_id: enrollment.id.clone(),
            kata: sheet.kata,
            kumite: sheet.kumite,
            kihon: sheet.kihon,
            final_grade: sheet.final_grade,
            observations: sheet.observations,
            present: sheet.present,
            recorded_at: Utc::now(),
        };

        let stored = self
            .storage
            .insert_result(result)
            .await
            .map_err(|e| match e {
                obi_storage::StorageError::Conflict(_) => {
                    WorkflowError::DuplicateResult(enrollment_id.to_string())
                }
                other => other.into(),
            })?;

        info!(
            enrollment = %stored.enrollment_id,
            final_grade = %stored.final_grade,
            present = stored.present,
            "exam result recorded"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obi_storage::{EnrollmentStore, InMemoryDojoStorage, NewEnrollment};
    use obi_types::{ExamId, GradeLabel, StudentId};

    async fn seed_enrollment(storage: &InMemoryDojoStorage) -> EnrollmentId {
        let enrollment = storage
            .insert_enrollment(NewEnrollment {
                id: EnrollmentId::new("enrollment-1"),
                exam_id: ExamId::new("exam-1"),
                student_id: StudentId::new("student-1"),
                belt: GradeLabel::from("Cinturón Naranja"),
            })
            .await
            .unwrap();
        enrollment.id
    }

    fn passing_sheet() -> ResultSheet {
        ResultSheet {
            kata: Some(LetterGrade::A),
            kumite: Some(LetterGrade::BPlus),
            kihon: Some(LetterGrade::A),
            final_grade: LetterGrade::AMinus,
            observations: "solid kata".to_string(),
            present: true,
        }
    }

    #[tokio::test]
    async fn records_a_result_once() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let enrollment_id = seed_enrollment(&storage).await;
        let recorder = ResultRecorder::new(storage);

        let stored = recorder
            .record_result(&enrollment_id, passing_sheet())
            .await
            .unwrap();
        assert_eq!(stored.final_grade, LetterGrade::AMinus);

        let second = recorder.record_result(&enrollment_id, passing_sheet()).await;
        assert!(matches!(second, Err(WorkflowError::DuplicateResult(_))));
    }

    #[tokio::test]
    async fn unknown_enrollment_is_rejected() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let recorder = ResultRecorder::new(storage);

        let result = recorder
            .record_result(&EnrollmentId::new("enrollment-missing"), passing_sheet())
            .await;
        assert!(matches!(result, Err(WorkflowError::EnrollmentNotFound(_))));
    }

    #[tokio::test]
    async fn absent_students_may_omit_component_grades() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let enrollment_id = seed_enrollment(&storage).await;
        let recorder = ResultRecorder::new(storage);

        let stored = recorder
            .record_result(
                &enrollment_id,
                ResultSheet {
                    kata: None,
                    kumite: None,
                    kihon: None,
                    final_grade: LetterGrade::F,
                    observations: "no se presentó".to_string(),
                    present: false,
                },
            )
            .await
            .unwrap();
        assert!(stored.kata.is_none());
        assert!(!stored.present);
    }

    #[test]
    fn parse_rejects_grades_outside_the_set() {
        let result = ResultSheet::parse(Some("A"), Some("Z"), None, "B", "", true);
        assert!(matches!(result, Err(WorkflowError::InvalidGrade(_))));

        let result = ResultSheet::parse(None, None, None, "aprobado", "", true);
        assert!(matches!(result, Err(WorkflowError::InvalidGrade(_))));
    }

    #[test]
    fn parse_accepts_a_full_sheet() {
        let sheet = ResultSheet::parse(Some("a+"), Some("b-"), Some("C"), "A-", "bien", true)
            .unwrap();
        assert_eq!(sheet.kata, Some(LetterGrade::APlus));
        assert_eq!(sheet.kumite, Some(LetterGrade::BMinus));
        assert_eq!(sheet.kihon, Some(LetterGrade::C));
        assert_eq!(sheet.final_grade, LetterGrade::AMinus);
    }
}
