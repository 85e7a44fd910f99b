//! Certificate issuer: the five-step issuance pipeline.
//!
//! 1. Insert a pending row, capturing the server-assigned `issued_at`.
//! 2. Derive the SHA-256 fingerprint from the tuple and that `issued_at`.
//! 3. Render the artifact embedding the hash text.
//! 4. Upload the artifact under a collision-resistant name.
//! 5. Record hash and locator on the row.
//!
//! Steps 2–5 are pure functions of the row inserted in step 1, so a failure
//! in 3 or 4 leaves a resumable "issued but unfinished" row; `resume`
//! re-runs them from the stored `issued_at` and reproduces the same hash.

use crate::error::CertificateError;
use crate::hash::derive_hash;
use obi_connectors::{BlobStore, CertificateFields, CertificateRenderer};
use obi_storage::{DojoStorage, NewCertificate};
use obi_types::{Certificate, CertificateId, ExamId, GradeLabel, StudentId};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct CertificateIssuer {
    storage: Arc<dyn DojoStorage>,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<dyn CertificateRenderer>,
}

impl CertificateIssuer {
    pub fn new(
        storage: Arc<dyn DojoStorage>,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> Self {
        Self {
            storage,
            blobs,
            renderer,
        }
    }

    /// Issue a certificate for an approved promotion.
    ///
    /// Guards the causal ordering at the call site: an enrollment with an
    /// approving, present result must exist for `(exam_id, student_id)`.
    /// On a render or upload failure the pending row survives with
    /// `hash`/`pdf_url` unset and the error names the failed step; complete
    /// it later with [`resume`](Self::resume).
    #[instrument(skip(self), fields(student = %student_id, exam = %exam_id, belt = %belt))]
    pub async fn issue(
        &self,
        student_id: &StudentId,
        exam_id: &ExamId,
        belt: &GradeLabel,
    ) -> Result<Certificate, CertificateError> {
        self.ensure_approved_result(exam_id, student_id).await?;

        let pending = self
            .storage
            .insert_certificate(NewCertificate {
                id: CertificateId::generate(),
                student_id: student_id.clone(),
                exam_id: exam_id.clone(),
                belt: belt.clone(),
            })
            .await?;
        info!(certificate = %pending.id, issued_at = %pending.issued_at, "pending certificate row created");

        self.complete(pending).await
    }

    /// Resume a partially issued certificate by id.
    ///
    /// Re-derives the hash from the stored `issued_at` — never a fresh
    /// timestamp — so the fingerprint is identical to what the original
    /// attempt would have produced. Already-complete certificates are
    /// returned as-is.
    pub async fn resume(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Certificate, CertificateError> {
        let certificate = self
            .storage
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| CertificateError::NotFound(certificate_id.to_string()))?;
        if certificate.issuance_complete() {
            return Ok(certificate);
        }
        self.complete(certificate).await
    }

    async fn ensure_approved_result(
        &self,
        exam_id: &ExamId,
        student_id: &StudentId,
    ) -> Result<(), CertificateError> {
        let missing = || CertificateError::MissingApprovedResult {
            exam: exam_id.to_string(),
            student: student_id.to_string(),
        };
        let enrollment = self
            .storage
            .find_enrollment(exam_id, student_id)
            .await?
            .ok_or_else(missing)?;
        let result = self
            .storage
            .get_result(&enrollment.id)
            .await?
            .ok_or_else(missing)?;
        if !result.present || !result.final_grade.is_passing() {
            return Err(missing());
        }
        Ok(())
    }

    /// Steps 2–5, shared by first issuance and resume.
    async fn complete(&self, certificate: Certificate) -> Result<Certificate, CertificateError> {
        let hash = derive_hash(
            &certificate.student_id,
            &certificate.exam_id,
            &certificate.belt,
            certificate.issued_at,
        );

        let fields = self.artifact_fields(&certificate, &hash).await?;
        let bytes = self.renderer.render(&fields)?;

        let path = format!(
            "certificates/{}-{}.pdf",
            certificate.id,
            certificate.issued_at.timestamp()
        );
        let locator = self.blobs.upload(&path, bytes).await?;

        let completed = self
            .storage
            .complete_issuance(&certificate.id, &hash, &locator)
            .await?;
        info!(
            certificate = %completed.id,
            hash = %hash,
            pdf_url = %locator,
            "certificate issuance completed"
        );
        Ok(completed)
    }

    async fn artifact_fields(
        &self,
        certificate: &Certificate,
        hash: &str,
    ) -> Result<CertificateFields, CertificateError> {
        let student = self
            .storage
            .get_student(&certificate.student_id)
            .await?
            .ok_or_else(|| CertificateError::NotFound(certificate.student_id.to_string()))?;
        let exam = self
            .storage
            .get_exam(&certificate.exam_id)
            .await?
            .ok_or_else(|| CertificateError::NotFound(certificate.exam_id.to_string()))?;
        let sensei = self
            .storage
            .get_sensei(&exam.sensei_id)
            .await?
            .ok_or_else(|| CertificateError::NotFound(exam.sensei_id.to_string()))?;

        Ok(CertificateFields {
            student_name: student.name,
            belt: certificate.belt.to_string(),
            exam_date: exam.date,
            sensei_name: sensei.name,
            hash_hex: hash.to_string(),
        })
    }
}
