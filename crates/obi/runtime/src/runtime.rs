//! The runtime facade: wires storage, connectors and the workflow steps,
//! and composes the grading pipeline.

use crate::config::RuntimeConfig;
use crate::error::RuntimeResult;
use chrono::{NaiveDate, Utc};
use obi_certificate::{CertificateIssuer, ValidationGate, ValidationOutcome};
use obi_connectors::{
    AnchorLedger, BlobStore, CertificateRenderer, FunctionInvoker, IdentityProvider,
};
use obi_storage::{DojoStorage, NewStudent, QueryWindow};
use obi_types::{
    Certificate, CertificateId, Dojo, DojoId, Enrollment, EnrollmentId, Exam, ExamId, ExamResult,
    GradeLabel, Sensei, SenseiId, Student, StudentId,
};
use obi_workflow::{EnrollmentRegistry, PromotionApplier, ResultRecorder, ResultSheet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Issuance status within a [`GradingOutcome`].
///
/// Distinguishes "nothing happened" from "promotion happened but the
/// certificate is unfinished": the latter must be resumed by id, never by
/// re-running the whole grading chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IssuanceStatus {
    /// No promotion, so no certificate was attempted.
    NotAttempted,
    /// Certificate fully issued.
    Issued { certificate: Certificate },
    /// The certificate row exists but the artifact pipeline did not finish.
    /// Resume with [`DojoRuntime::resume_certificate`].
    Unfinished {
        certificate_id: CertificateId,
        error: String,
    },
    /// The pending row itself never got inserted. Nothing to resume; the
    /// promotion still stands, re-grading is not the fix.
    Failed { error: String },
}

/// Outcome of the composed grading pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradingOutcome {
    pub result: ExamResult,
    pub promoted: bool,
    pub new_belt: Option<GradeLabel>,
    pub issuance: IssuanceStatus,
}

/// Facade over the full belt-progression workflow.
pub struct DojoRuntime {
    storage: Arc<dyn DojoStorage>,
    identity: Arc<dyn IdentityProvider>,
    invoker: Arc<dyn FunctionInvoker>,
    registry: EnrollmentRegistry,
    recorder: ResultRecorder,
    applier: PromotionApplier,
    issuer: CertificateIssuer,
    gate: ValidationGate,
    config: RuntimeConfig,
}

impl DojoRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn DojoStorage>,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<dyn CertificateRenderer>,
        anchor: Arc<dyn AnchorLedger>,
        identity: Arc<dyn IdentityProvider>,
        invoker: Arc<dyn FunctionInvoker>,
        config: RuntimeConfig,
    ) -> Self {
        let registry = EnrollmentRegistry::new(
            storage.clone(),
            config.ladder.clone(),
            config.grade_policy,
        );
        let recorder = ResultRecorder::new(storage.clone());
        let applier = PromotionApplier::new(storage.clone(), config.ladder.clone());
        let issuer = CertificateIssuer::new(storage.clone(), blobs, renderer);
        let gate = ValidationGate::new(storage.clone(), anchor);
        Self {
            storage,
            identity,
            invoker,
            registry,
            recorder,
            applier,
            issuer,
            gate,
            config,
        }
    }

    pub fn storage(&self) -> Arc<dyn DojoStorage> {
        self.storage.clone()
    }

    // ── Roster ──────────────────────────────────────────────────────

    pub async fn register_dojo(
        &self,
        name: impl Into<String>,
        city: impl Into<String>,
    ) -> RuntimeResult<Dojo> {
        let dojo = Dojo {
            id: DojoId::generate(),
            name: name.into(),
            city: city.into(),
            created_at: Utc::now(),
        };
        self.storage.insert_dojo(dojo.clone()).await?;
        Ok(dojo)
    }

    pub async fn register_sensei(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        dojo_id: &DojoId,
    ) -> RuntimeResult<Sensei> {
        let sensei = Sensei {
            id: SenseiId::generate(),
            name: name.into(),
            email: email.into(),
            dojo_id: dojo_id.clone(),
            created_at: Utc::now(),
        };
        self.storage.insert_sensei(sensei.clone()).await?;
        Ok(sensei)
    }

    /// Register a student. With no belt given they start at the bottom of
    /// the ladder; an explicit starting belt must exist on the ladder.
    pub async fn register_student(
        &self,
        name: impl Into<String>,
        dojo_id: &DojoId,
        starting_belt: Option<GradeLabel>,
    ) -> RuntimeResult<Student> {
        let belt = match starting_belt {
            None => self.config.ladder.first().clone(),
            Some(belt) => {
                let position = self.config.ladder.position(belt.as_str())?;
                self.config.ladder.grades()[position].clone()
            }
        };
        let student = self
            .storage
            .insert_student(NewStudent {
                id: StudentId::generate(),
                name: name.into(),
                dojo_id: dojo_id.clone(),
                current_belt: belt,
            })
            .await?;

        // Login provisioning runs with elevated privilege on the backend;
        // best-effort, the roster record is the source of truth either way.
        let payload = serde_json::json!({
            "student_id": student.id.to_string(),
            "name": student.name,
            "dojo_id": student.dojo_id.to_string(),
        });
        if let Err(e) = self.invoker.invoke("provision_student_account", payload).await {
            warn!(student = %student.id, error = %e, "account provisioning failed");
        }
        Ok(student)
    }

    /// Soft delete: the student stays on record for certificate and exam
    /// history, but can no longer enroll.
    pub async fn deactivate_student(&self, student_id: &StudentId) -> RuntimeResult<Student> {
        Ok(self.storage.set_student_active(student_id, false).await?)
    }

    pub async fn create_exam(
        &self,
        date: NaiveDate,
        sensei_id: &SenseiId,
        organizing_dojo: &DojoId,
        location_dojo: &DojoId,
        observations: impl Into<String>,
    ) -> RuntimeResult<Exam> {
        let exam = Exam {
            id: ExamId::generate(),
            date,
            sensei_id: sensei_id.clone(),
            organizing_dojo: organizing_dojo.clone(),
            location_dojo: location_dojo.clone(),
            observations: observations.into(),
            created_at: Utc::now(),
        };
        self.storage.insert_exam(exam.clone()).await?;
        Ok(exam)
    }

    pub async fn get_student(&self, id: &StudentId) -> RuntimeResult<Option<Student>> {
        Ok(self.storage.get_student(id).await?)
    }

    pub async fn list_students(&self, dojo: &DojoId) -> RuntimeResult<Vec<Student>> {
        Ok(self
            .storage
            .list_students(dojo, QueryWindow::default())
            .await?)
    }

    pub async fn list_certificates(&self, student: &StudentId) -> RuntimeResult<Vec<Certificate>> {
        Ok(self.storage.list_certificates_for_student(student).await?)
    }

    // ── Workflow ────────────────────────────────────────────────────

    /// Enroll a student in an exam; see [`EnrollmentRegistry::enroll`].
    pub async fn enroll(
        &self,
        exam_id: &ExamId,
        student_id: &StudentId,
        belt: Option<GradeLabel>,
    ) -> RuntimeResult<Enrollment> {
        Ok(self.registry.enroll(exam_id, student_id, belt).await?)
    }

    /// The composed grading pipeline: record result → apply promotion →
    /// issue certificate.
    ///
    /// Promotion is the source of truth for "did the student pass": once it
    /// commits, an issuance failure is surfaced in the outcome as
    /// [`IssuanceStatus::Unfinished`] rather than failing the call, so the
    /// caller retries only the failed step.
    pub async fn grade_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
        sheet: ResultSheet,
    ) -> RuntimeResult<GradingOutcome> {
        let result = self.recorder.record_result(enrollment_id, sheet).await?;
        let enrollment = self
            .storage
            .get_enrollment(enrollment_id)
            .await?
            .ok_or_else(|| {
                obi_workflow::WorkflowError::EnrollmentNotFound(enrollment_id.to_string())
            })?;
        self.promote_and_issue(enrollment, result).await
    }

    /// Re-run promotion and issuance for an enrollment whose result is
    /// already on record.
    ///
    /// The grading call can fail after the result commits, e.g. when the
    /// conditional belt update loses to a writer in another process. The
    /// result is write-once, so re-grading is not the recovery path; this
    /// operation re-reads the stored result and re-runs only the steps
    /// after it. Re-applying a landed promotion is a no-op and an already
    /// issued certificate is returned as-is.
    pub async fn promote_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
    ) -> RuntimeResult<GradingOutcome> {
        let enrollment = self
            .storage
            .get_enrollment(enrollment_id)
            .await?
            .ok_or_else(|| {
                obi_workflow::WorkflowError::EnrollmentNotFound(enrollment_id.to_string())
            })?;
        let result = self
            .storage
            .get_result(enrollment_id)
            .await?
            .ok_or_else(|| {
                obi_workflow::WorkflowError::ResultNotFound(enrollment_id.to_string())
            })?;
        self.promote_and_issue(enrollment, result).await
    }

    async fn promote_and_issue(
        &self,
        enrollment: Enrollment,
        result: ExamResult,
    ) -> RuntimeResult<GradingOutcome> {
        let promotion = self.applier.apply_promotion(&enrollment, &result).await?;
        if !promotion.promoted {
            return Ok(GradingOutcome {
                result,
                promoted: false,
                new_belt: None,
                issuance: IssuanceStatus::NotAttempted,
            });
        }

        let issuance = self
            .issue_with_retry(&enrollment.student_id, &enrollment.exam_id, &enrollment.belt)
            .await;
        Ok(GradingOutcome {
            result,
            promoted: true,
            new_belt: promotion.new_belt,
            issuance,
        })
    }

    /// Issue with bounded retry. Render/storage failures leave a resumable
    /// row; after the retry budget is spent the unfinished certificate id is
    /// returned so the caller can resume later.
    async fn issue_with_retry(
        &self,
        student_id: &StudentId,
        exam_id: &ExamId,
        belt: &GradeLabel,
    ) -> IssuanceStatus {
        // An earlier run may already have a row for this pair: a complete
        // one is returned as-is, an unfinished one is resumed rather than
        // duplicated.
        let first_attempt = match self.latest_certificate(student_id, exam_id).await {
            Some(certificate) if certificate.issuance_complete() => {
                return IssuanceStatus::Issued { certificate }
            }
            Some(pending) => self.issuer.resume(&pending.id).await,
            None => self.issuer.issue(student_id, exam_id, belt).await,
        };
        let mut failure = match first_attempt {
            Ok(certificate) => return IssuanceStatus::Issued { certificate },
            Err(e) => e,
        };

        // A failed first attempt may still have created the pending row;
        // retries resume that row instead of inserting another.
        for attempt in 0..self.config.issuance_retries {
            let Some(pending_id) = self.pending_certificate(student_id, exam_id).await else {
                break;
            };
            tokio::time::sleep(Duration::from_millis(self.config.issuance_backoff_ms)).await;
            warn!(
                certificate = %pending_id,
                attempt = attempt + 1,
                error = %failure,
                "retrying certificate issuance"
            );
            match self.issuer.resume(&pending_id).await {
                Ok(certificate) => return IssuanceStatus::Issued { certificate },
                Err(e) => failure = e,
            }
        }

        match self.pending_certificate(student_id, exam_id).await {
            Some(certificate_id) => {
                warn!(
                    certificate = %certificate_id,
                    error = %failure,
                    "certificate issuance unfinished; resume later"
                );
                IssuanceStatus::Unfinished {
                    certificate_id,
                    error: failure.to_string(),
                }
            }
            None => IssuanceStatus::Failed {
                error: failure.to_string(),
            },
        }
    }

    async fn latest_certificate(
        &self,
        student_id: &StudentId,
        exam_id: &ExamId,
    ) -> Option<Certificate> {
        let certificates = self
            .storage
            .list_certificates_for_student(student_id)
            .await
            .ok()?;
        certificates.into_iter().rev().find(|c| &c.exam_id == exam_id)
    }

    async fn pending_certificate(
        &self,
        student_id: &StudentId,
        exam_id: &ExamId,
    ) -> Option<CertificateId> {
        self.latest_certificate(student_id, exam_id)
            .await
            .filter(|c| !c.issuance_complete())
            .map(|c| c.id)
    }

    /// Complete a previously unfinished issuance.
    pub async fn resume_certificate(
        &self,
        certificate_id: &CertificateId,
    ) -> RuntimeResult<Certificate> {
        Ok(self.issuer.resume(certificate_id).await?)
    }

    /// Mark a certificate valid; best-effort anchors its hash.
    ///
    /// Without an explicit validator the session identity is recorded as
    /// the validating sensei.
    pub async fn validate_certificate(
        &self,
        certificate_id: &CertificateId,
        validator: Option<&SenseiId>,
    ) -> RuntimeResult<ValidationOutcome> {
        let validator = self.resolve_validator(validator).await?;
        let outcome = self.gate.validate(certificate_id, &validator).await?;
        if let Some(reason) = &outcome.anchor_failure {
            info!(
                certificate = %outcome.certificate.id,
                reason = %reason,
                "validated locally; anchoring pending"
            );
        }
        Ok(outcome)
    }

    /// Mark a certificate revoked.
    pub async fn revoke_certificate(
        &self,
        certificate_id: &CertificateId,
        validator: Option<&SenseiId>,
    ) -> RuntimeResult<ValidationOutcome> {
        let validator = self.resolve_validator(validator).await?;
        Ok(self.gate.revoke(certificate_id, &validator).await?)
    }

    async fn resolve_validator(&self, explicit: Option<&SenseiId>) -> RuntimeResult<SenseiId> {
        match explicit {
            Some(validator) => Ok(validator.clone()),
            None => {
                let user = self.identity.current_user().await?;
                Ok(SenseiId::new(user.id))
            }
        }
    }
}
