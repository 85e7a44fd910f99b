//! Enrollment registry: records a student's intent to attempt a grade.

use crate::error::WorkflowError;
use obi_storage::{DojoStorage, NewEnrollment};
use obi_types::{BeltLadder, Enrollment, EnrollmentId, ExamId, GradeLabel, StudentId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Policy for explicit belt selection at enrollment time.
///
/// The workflow defaults every enrollment to the next rung above the
/// student's current belt. Whether a sensei may override that is an explicit
/// configuration choice, not an implicit permission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradePolicy {
    /// Enrollments always attempt the next grade; explicit belts that differ
    /// from it are rejected.
    #[default]
    NextGradeOnly,
    /// The sensei may pick any grade on the ladder. Regressions are still
    /// caught at promotion time.
    SenseiChoice,
}

/// Records enrollments, computing the default attempted grade from the belt
/// ladder. Duplicate `(exam, student)` pairs are rejected by the storage
/// layer's uniqueness constraint, so the guarantee holds under concurrent
/// submissions.
pub struct EnrollmentRegistry {
    storage: Arc<dyn DojoStorage>,
    ladder: BeltLadder,
    policy: GradePolicy,
}

impl EnrollmentRegistry {
    pub fn new(storage: Arc<dyn DojoStorage>, ladder: BeltLadder, policy: GradePolicy) -> Self {
        Self {
            storage,
            ladder,
            policy,
        }
    }

    /// Enroll `student_id` in `exam_id`.
    ///
    /// With `belt = None` the attempted grade is
    /// `next_grade(student.current_belt)`. An explicit belt is accepted only
    /// under [`GradePolicy::SenseiChoice`] (or when it matches the computed
    /// default), and must exist on the ladder.
    pub async fn enroll(
        &self,
        exam_id: &ExamId,
        student_id: &StudentId,
        belt: Option<GradeLabel>,
    ) -> Result<Enrollment, WorkflowError> {
        let exam = self
            .storage
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| WorkflowError::ExamNotFound(exam_id.to_string()))?;
        let student = self
            .storage
            .get_student(student_id)
            .await?
            .ok_or_else(|| WorkflowError::StudentNotFound(student_id.to_string()))?;
        if !student.is_active {
            return Err(WorkflowError::InactiveStudent(student_id.to_string()));
        }

        let default_belt = self.ladder.next_grade(student.current_belt.as_str())?;
        let attempted = match belt {
            None => default_belt,
            Some(requested) => {
                // Canonicalize through the ladder so stored labels match.
                let position = self.ladder.position(requested.as_str())?;
                let canonical = self.ladder.grades()[position].clone();
                if self.policy == GradePolicy::NextGradeOnly && canonical != default_belt {
                    return Err(WorkflowError::ExplicitBeltRejected(self.policy));
                }
                canonical
            }
        };

        let enrollment = self
            .storage
            .insert_enrollment(NewEnrollment {
                id: EnrollmentId::generate(),
                exam_id: exam.id.clone(),
                student_id: student.id.clone(),
                belt: attempted,
            })
            .await
            .map_err(|e| match e {
                obi_storage::StorageError::Conflict(_) => WorkflowError::DuplicateEnrollment {
                    exam: exam_id.to_string(),
                    student: student_id.to_string(),
                },
                other => other.into(),
            })?;

        info!(
            enrollment = %enrollment.id,
            exam = %enrollment.exam_id,
            student = %enrollment.student_id,
            belt = %enrollment.belt,
            "enrollment recorded"
        );
        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use obi_storage::{InMemoryDojoStorage, NewStudent, StudentStore};
    use obi_types::{DojoId, Exam, ExamId, SenseiId};

    async fn seed(storage: &InMemoryDojoStorage, belt: &str) -> (ExamId, StudentId) {
        let exam = Exam {
            id: ExamId::new("exam-1"),
            date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            sensei_id: SenseiId::new("sensei-1"),
            organizing_dojo: DojoId::new("dojo-1"),
            location_dojo: DojoId::new("dojo-1"),
            observations: String::new(),
            created_at: Utc::now(),
        };
        obi_storage::ExamStore::insert_exam(storage, exam).await.unwrap();
        storage
            .insert_student(NewStudent {
                id: StudentId::new("student-1"),
                name: "Ana Torres".to_string(),
                dojo_id: DojoId::new("dojo-1"),
                current_belt: GradeLabel::from(belt),
            })
            .await
            .unwrap();
        (ExamId::new("exam-1"), StudentId::new("student-1"))
    }

    fn registry(storage: Arc<InMemoryDojoStorage>, policy: GradePolicy) -> EnrollmentRegistry {
        EnrollmentRegistry::new(storage, BeltLadder::standard(), policy)
    }

    #[tokio::test]
    async fn default_belt_is_the_next_rung() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;
        let registry = registry(storage, GradePolicy::NextGradeOnly);

        let enrollment = registry.enroll(&exam, &student, None).await.unwrap();
        assert_eq!(enrollment.belt.as_str(), "Cinturón Naranja");
    }

    #[tokio::test]
    async fn duplicate_enrollment_is_rejected_with_a_specific_error() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;
        let registry = registry(storage, GradePolicy::NextGradeOnly);

        registry.enroll(&exam, &student, None).await.unwrap();
        let second = registry.enroll(&exam, &student, None).await;
        assert!(matches!(
            second,
            Err(WorkflowError::DuplicateEnrollment { .. })
        ));
    }

    #[tokio::test]
    async fn inactive_students_cannot_enroll() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;
        storage.set_student_active(&student, false).await.unwrap();
        let registry = registry(storage, GradePolicy::NextGradeOnly);

        let result = registry.enroll(&exam, &student, None).await;
        assert!(matches!(result, Err(WorkflowError::InactiveStudent(_))));
    }

    #[tokio::test]
    async fn unknown_exam_and_student_are_distinct_errors() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;
        let registry = registry(storage, GradePolicy::NextGradeOnly);

        let missing_exam = registry
            .enroll(&ExamId::new("exam-missing"), &student, None)
            .await;
        assert!(matches!(missing_exam, Err(WorkflowError::ExamNotFound(_))));

        let missing_student = registry
            .enroll(&exam, &StudentId::new("student-missing"), None)
            .await;
        assert!(matches!(
            missing_student,
            Err(WorkflowError::StudentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn explicit_belt_requires_the_sensei_choice_policy() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;

        let strict = registry(storage.clone(), GradePolicy::NextGradeOnly);
        let rejected = strict
            .enroll(&exam, &student, Some(GradeLabel::from("Cinturón Verde")))
            .await;
        assert!(matches!(
            rejected,
            Err(WorkflowError::ExplicitBeltRejected(_))
        ));

        let permissive = registry(storage, GradePolicy::SenseiChoice);
        let enrollment = permissive
            .enroll(&exam, &student, Some(GradeLabel::from(" cinturón verde ")))
            .await
            .unwrap();
        // Canonical ladder label is stored, not the raw input.
        assert_eq!(enrollment.belt.as_str(), "Cinturón Verde");
    }

    #[tokio::test]
    async fn explicit_belt_matching_the_default_is_accepted_under_strict_policy() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;
        let registry = registry(storage, GradePolicy::NextGradeOnly);

        let enrollment = registry
            .enroll(&exam, &student, Some(GradeLabel::from("Cinturón Naranja")))
            .await
            .unwrap();
        assert_eq!(enrollment.belt.as_str(), "Cinturón Naranja");
    }

    #[tokio::test]
    async fn explicit_belt_off_the_ladder_is_rejected() {
        let storage = Arc::new(InMemoryDojoStorage::new());
        let (exam, student) = seed(&storage, "Cinturón Amarillo").await;
        let registry = registry(storage, GradePolicy::SenseiChoice);

        let result = registry
            .enroll(&exam, &student, Some(GradeLabel::from("Cinturón Morado")))
            .await;
        assert!(matches!(result, Err(WorkflowError::UnknownGrade(_))));
    }
}
