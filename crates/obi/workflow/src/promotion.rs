//! Promotion applier: advances a student's belt after an approved result.

use crate::approval::is_approved;
use crate::error::WorkflowError;
use obi_storage::DojoStorage;
use obi_types::{BeltLadder, Enrollment, ExamResult, GradeLabel, StudentId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of a promotion attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Promotion {
    pub promoted: bool,
    pub new_belt: Option<GradeLabel>,
}

impl Promotion {
    fn skipped() -> Self {
        Self {
            promoted: false,
            new_belt: None,
        }
    }
}

/// Applies promotions: the single writer path for `Student.current_belt`.
///
/// Calls are serialized per student id so two different exams cannot
/// interleave promotions for the same student; the conditional belt update
/// in the store is the backstop against writers outside this process.
pub struct PromotionApplier {
    storage: Arc<dyn DojoStorage>,
    ladder: BeltLadder,
    locks: Mutex<HashMap<StudentId, Arc<Mutex<()>>>>,
}

impl PromotionApplier {
    pub fn new(storage: Arc<dyn DojoStorage>, ladder: BeltLadder) -> Self {
        Self {
            storage,
            ladder,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn student_lock(&self, student_id: &StudentId) -> Arc<Mutex<()>> {
        let mut guard = self.locks.lock().await;
        guard
            .entry(student_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply the promotion implied by an approved result.
    ///
    /// Returns `promoted: false` without touching the student when the
    /// result is not approving or the student was absent. On approval the
    /// student's belt is overwritten with the enrolled grade; an enrollment
    /// whose grade sits below the student's current belt is stale and fails
    /// with [`WorkflowError::Regression`].
    pub async fn apply_promotion(
        &self,
        enrollment: &Enrollment,
        result: &ExamResult,
    ) -> Result<Promotion, WorkflowError> {
        if enrollment.id != result.enrollment_id {
            return Err(WorkflowError::Backend(format!(
                "result {} does not belong to enrollment {}",
                result.enrollment_id, enrollment.id
            )));
        }
        if !result.present || !is_approved(result.final_grade) {
            info!(
                enrollment = %enrollment.id,
                final_grade = %result.final_grade,
                present = result.present,
                "no promotion: result not approving"
            );
            return Ok(Promotion::skipped());
        }

        let lock = self.student_lock(&enrollment.student_id).await;
        let _serialized = lock.lock().await;

        let student = self
            .storage
            .get_student(&enrollment.student_id)
            .await?
            .ok_or_else(|| WorkflowError::StudentNotFound(enrollment.student_id.to_string()))?;

        match self
            .ladder
            .compare(enrollment.belt.as_str(), student.current_belt.as_str())?
        {
            Ordering::Less => {
                warn!(
                    student = %student.id,
                    current = %student.current_belt,
                    attempted = %enrollment.belt,
                    "stale enrollment would regress the student"
                );
                return Err(WorkflowError::Regression {
                    student: student.id.to_string(),
                    current: student.current_belt.to_string(),
                    attempted: enrollment.belt.to_string(),
                });
            }
            Ordering::Equal => {
                // Re-applying the same promotion (e.g. a retried pipeline)
                // is a no-op, not an error.
                return Ok(Promotion {
                    promoted: true,
                    new_belt: Some(student.current_belt),
                });
            }
            Ordering::Greater => {}
        }

        let updated = self
            .storage
            .update_student_belt(&student.id, &student.current_belt, &enrollment.belt)
            .await?;

        info!(
            student = %updated.id,
            new_belt = %updated.current_belt,
            "student promoted"
        );
        Ok(Promotion {
            promoted: true,
            new_belt: Some(updated.current_belt),
        })
    }
}
