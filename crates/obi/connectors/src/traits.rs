use crate::error::{AnchorError, BlobError, IdentityError, InvokeError, RenderError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated user on whose behalf workflow actions run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
}

/// Identity/session provider. The workflow trusts the returned id as the
/// acting sensei/validator identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<UserAccount, IdentityError>;
}

/// Durable blob storage for certificate artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload bytes under `path`, returning the durable locator.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, BlobError>;

    /// Fetch previously uploaded bytes by locator.
    async fn download(&self, locator: &str) -> Result<Vec<u8>, BlobError>;
}

/// Field set embedded into a certificate artifact.
///
/// `hash_hex` is embedded verbatim so a holder can re-verify the artifact
/// against the certificate row independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFields {
    pub student_name: String,
    pub belt: String,
    pub exam_date: NaiveDate,
    pub sensei_name: String,
    pub hash_hex: String,
}

/// Pure transform from certificate fields to a document artifact.
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, fields: &CertificateFields) -> Result<Vec<u8>, RenderError>;
}

/// Receipt returned by the anchoring ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub tx_id: String,
    pub anchored_at: DateTime<Utc>,
}

/// External tamper-evident ledger. Called best-effort from the certificate
/// validation gate; a failure here never rolls back local state.
#[async_trait]
pub trait AnchorLedger: Send + Sync {
    async fn register_certificate(&self, hash_hex: &str) -> Result<AnchorReceipt, AnchorError>;
}

/// Opaque channel for operations needing elevated privilege (e.g. creating
/// a sensei or student login identity). Out of scope for the workflow core;
/// modeled so the runtime can thread it through.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, InvokeError>;
}
