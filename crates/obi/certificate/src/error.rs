use obi_connectors::{BlobError, RenderError};
use obi_storage::StorageError;
use thiserror::Error;

/// Certificate pipeline errors.
///
/// `Render` and `ArtifactStorage` leave the certificate row in a
/// recoverable "issued but unfinished" state; callers retry via
/// `CertificateIssuer::resume` without losing the row-bound `issued_at`.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate {0} not found")]
    NotFound(String),

    #[error("no approved result exists for student {student} in exam {exam}")]
    MissingApprovedResult { exam: String, student: String },

    #[error("certificate {0} is already finalized")]
    AlreadyFinalized(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("artifact storage failed: {0}")]
    ArtifactStorage(#[from] BlobError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for CertificateError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::Conflict(msg),
            StorageError::InvariantViolation(msg)
            | StorageError::InvalidInput(msg)
            | StorageError::Serialization(msg)
            | StorageError::Backend(msg) => Self::Backend(msg),
        }
    }
}
