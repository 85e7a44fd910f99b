use obi_certificate::CertificateError;
use obi_connectors::IdentityError;
use obi_storage::StorageError;
use obi_types::LadderError;
use obi_workflow::WorkflowError;
use thiserror::Error;

/// Errors surfaced by the runtime facade.
///
/// Mostly transparent wrappers: the underlying layers already phrase their
/// errors for the caller, the facade just unifies them into one type.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Ladder(#[from] LadderError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
