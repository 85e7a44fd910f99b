use thiserror::Error;

/// Certificate artifact generation failed.
#[derive(Debug, Error)]
#[error("render error: {0}")]
pub struct RenderError(pub String);

/// Durable blob storage failed (upload or download).
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob upload failed: {0}")]
    Upload(String),

    #[error("blob download failed: {0}")]
    Download(String),
}

/// The best-effort external anchoring call failed.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("anchoring ledger rejected the hash: {0}")]
    Reverted(String),

    #[error("anchoring ledger unreachable: {0}")]
    Unreachable(String),
}

/// The identity/session provider failed or has no session.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no active session")]
    NoSession,

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// A serverless function invocation failed.
#[derive(Debug, Error)]
#[error("function '{name}' failed: {message}")]
pub struct InvokeError {
    pub name: String,
    pub message: String,
}
