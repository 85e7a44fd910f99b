use obi_storage::StorageError;
use obi_types::LadderError;
use thiserror::Error;

/// Workflow errors surfaced to the invoking action.
///
/// The first group is caller-correctable and must not be retried blindly;
/// `StaleState` means "re-read and re-evaluate"; `Backend` is an opaque
/// storage failure.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("exam {0} not found")]
    ExamNotFound(String),

    #[error("student {0} not found")]
    StudentNotFound(String),

    #[error("student {0} is inactive and cannot enroll")]
    InactiveStudent(String),

    #[error("student {student} is already enrolled in exam {exam}")]
    DuplicateEnrollment { exam: String, student: String },

    #[error("enrollment {0} not found")]
    EnrollmentNotFound(String),

    #[error("a result has already been recorded for enrollment {0}")]
    DuplicateResult(String),

    #[error("no result recorded for enrollment {0}")]
    ResultNotFound(String),

    #[error(transparent)]
    InvalidGrade(#[from] obi_types::GradeParseError),

    #[error(transparent)]
    UnknownGrade(#[from] LadderError),

    #[error("explicit belt selection is not allowed under the {0:?} policy")]
    ExplicitBeltRejected(crate::enrollment::GradePolicy),

    #[error(
        "promotion to '{attempted}' would lower student {student} from '{current}' — stale enrollment"
    )]
    Regression {
        student: String,
        current: String,
        attempted: String,
    },

    #[error("concurrent update detected: {0}; re-read the record and retry")]
    StaleState(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for WorkflowError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(msg) => Self::StaleState(msg),
            StorageError::NotFound(msg)
            | StorageError::InvariantViolation(msg)
            | StorageError::InvalidInput(msg)
            | StorageError::Serialization(msg)
            | StorageError::Backend(msg) => Self::Backend(msg),
        }
    }
}
