//! Certificate validation gate: the one-way pending → valid/revoked
//! transition, with best-effort external anchoring.

use crate::error::CertificateError;
use obi_connectors::AnchorLedger;
use obi_storage::DojoStorage;
use obi_types::{Certificate, CertificateId, CertificateStatus, SenseiId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a validation-gate transition.
///
/// `anchor_failure` is populated when the local transition committed but
/// the external anchoring call failed; the caller may retry anchoring
/// independently without touching local state.
#[derive(Clone, Debug)]
pub struct ValidationOutcome {
    pub certificate: Certificate,
    pub anchored: bool,
    pub anchor_failure: Option<String>,
}

/// Applies validate/revoke transitions.
///
/// `Valid` and `Revoked` are terminal; the storage layer's conditional
/// update rejects a second transition, which surfaces here as
/// [`CertificateError::AlreadyFinalized`].
pub struct ValidationGate {
    storage: Arc<dyn DojoStorage>,
    anchor: Arc<dyn AnchorLedger>,
}

impl ValidationGate {
    pub fn new(storage: Arc<dyn DojoStorage>, anchor: Arc<dyn AnchorLedger>) -> Self {
        Self { storage, anchor }
    }

    /// Mark a pending certificate valid and best-effort anchor its hash.
    ///
    /// The local transition is authoritative: an anchoring failure is
    /// reported in the outcome, never rolled back.
    pub async fn validate(
        &self,
        certificate_id: &CertificateId,
        validator: &SenseiId,
    ) -> Result<ValidationOutcome, CertificateError> {
        let certificate = self
            .finalize(certificate_id, CertificateStatus::Valid, validator)
            .await?;

        let (anchored, anchor_failure) = match &certificate.hash {
            Some(hash) => match self.anchor.register_certificate(hash).await {
                Ok(receipt) => {
                    info!(
                        certificate = %certificate.id,
                        tx = %receipt.tx_id,
                        "certificate hash anchored"
                    );
                    (true, None)
                }
                Err(e) => {
                    warn!(
                        certificate = %certificate.id,
                        error = %e,
                        "anchoring failed; local validation stands"
                    );
                    (false, Some(e.to_string()))
                }
            },
            // Unfinished issuance: nothing to anchor yet. The certificate is
            // still validly finalized locally.
            None => (false, Some("certificate has no hash to anchor".to_string())),
        };

        Ok(ValidationOutcome {
            certificate,
            anchored,
            anchor_failure,
        })
    }

    /// Mark a pending certificate revoked. Revocation is never anchored.
    pub async fn revoke(
        &self,
        certificate_id: &CertificateId,
        validator: &SenseiId,
    ) -> Result<ValidationOutcome, CertificateError> {
        let certificate = self
            .finalize(certificate_id, CertificateStatus::Revoked, validator)
            .await?;
        Ok(ValidationOutcome {
            certificate,
            anchored: false,
            anchor_failure: None,
        })
    }

    async fn finalize(
        &self,
        certificate_id: &CertificateId,
        status: CertificateStatus,
        validator: &SenseiId,
    ) -> Result<Certificate, CertificateError> {
        let certificate = self
            .storage
            .finalize_certificate(certificate_id, status, validator, Utc::now())
            .await
            .map_err(|e| match e {
                obi_storage::StorageError::Conflict(_) => {
                    CertificateError::AlreadyFinalized(certificate_id.to_string())
                }
                other => other.into(),
            })?;
        info!(
            certificate = %certificate.id,
            status = %certificate.status,
            validated_by = %validator,
            "certificate finalized"
        );
        Ok(certificate)
    }
}
