//! Runtime facade for the dojo administration workflow.
//!
//! [`DojoRuntime`] wires the storage backend, the external connectors and
//! the workflow steps into the sensei-facing operations, and composes the
//! grading pipeline: record result → apply promotion → issue certificate,
//! with bounded retry on the issuance step.

#![deny(unsafe_code)]

mod config;
mod error;
mod runtime;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{DojoRuntime, GradingOutcome, IssuanceStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use obi_connectors::{
        BlobStore, MemoryAnchorLedger, MemoryBlobStore, RecordingFunctionInvoker,
        StaticIdentityProvider, TextCertificateRenderer,
    };
    use obi_storage::InMemoryDojoStorage;
    use obi_types::{CertificateStatus, LetterGrade};
    use obi_workflow::{ResultRecorder, ResultSheet, WorkflowError};
    use std::sync::Arc;

    struct Harness {
        runtime: DojoRuntime,
        blobs: Arc<MemoryBlobStore>,
        ledger: Arc<MemoryAnchorLedger>,
        invoker: Arc<RecordingFunctionInvoker>,
    }

    fn harness() -> Harness {
        let blobs = Arc::new(MemoryBlobStore::new());
        let ledger = Arc::new(MemoryAnchorLedger::new());
        let invoker = Arc::new(RecordingFunctionInvoker::new());
        let config = RuntimeConfig {
            issuance_backoff_ms: 0,
            ..RuntimeConfig::default()
        };
        let runtime = DojoRuntime::new(
            Arc::new(InMemoryDojoStorage::new()),
            blobs.clone(),
            Arc::new(TextCertificateRenderer::new()),
            ledger.clone(),
            Arc::new(StaticIdentityProvider::new(
                "sensei-session",
                "session@dojo.example",
            )),
            invoker.clone(),
            config,
        );
        Harness {
            runtime,
            blobs,
            ledger,
            invoker,
        }
    }

    fn passing_sheet() -> ResultSheet {
        ResultSheet {
            kata: Some(LetterGrade::A),
            kumite: Some(LetterGrade::BPlus),
            kihon: Some(LetterGrade::AMinus),
            final_grade: LetterGrade::A,
            observations: "examen sólido".to_string(),
            present: true,
        }
    }

    async fn seed_enrollment(
        runtime: &DojoRuntime,
    ) -> (obi_types::Enrollment, obi_types::SenseiId) {
        let dojo = runtime
            .register_dojo("Dojo Central", "Sevilla")
            .await
            .unwrap();
        let sensei = runtime
            .register_sensei("Marta Ruiz", "marta@dojo.example", &dojo.id)
            .await
            .unwrap();
        let student = runtime
            .register_student(
                "Ana Torres",
                &dojo.id,
                Some("Cinturón Amarillo".into()),
            )
            .await
            .unwrap();
        let exam = runtime
            .create_exam(
                NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
                &sensei.id,
                &dojo.id,
                &dojo.id,
                "examen de primavera",
            )
            .await
            .unwrap();
        let enrollment = runtime.enroll(&exam.id, &student.id, None).await.unwrap();
        (enrollment, sensei.id)
    }

    #[tokio::test]
    async fn full_progression_from_enrollment_to_validated_certificate() {
        let h = harness();
        let (enrollment, sensei) = seed_enrollment(&h.runtime).await;
        // Default attempted grade is the next rung above Amarillo.
        assert_eq!(enrollment.belt.as_str(), "Cinturón Naranja");

        let outcome = h
            .runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await
            .unwrap();
        assert!(outcome.promoted);
        assert_eq!(
            outcome.new_belt.as_ref().unwrap().as_str(),
            "Cinturón Naranja"
        );
        let IssuanceStatus::Issued { certificate } = outcome.issuance else {
            panic!("expected an issued certificate, got {:?}", outcome.issuance);
        };
        let hash = certificate.hash.clone().unwrap();
        let url = certificate.pdf_url.clone().unwrap();

        // The student record moved with the promotion.
        let student = h
            .runtime
            .get_student(&enrollment.student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.current_belt.as_str(), "Cinturón Naranja");

        // The uploaded artifact embeds the certificate hash.
        let artifact = h.blobs.download(&url).await.unwrap();
        let text = String::from_utf8(artifact).unwrap();
        assert!(text.contains(&hash));
        assert!(text.contains("Ana Torres"));

        // Validation finalizes the certificate and anchors its hash.
        let validated = h
            .runtime
            .validate_certificate(&certificate.id, Some(&sensei))
            .await
            .unwrap();
        assert_eq!(validated.certificate.status, CertificateStatus::Valid);
        assert!(validated.anchored);
        assert_eq!(h.ledger.anchored_hashes(), vec![hash]);
    }

    #[tokio::test]
    async fn failing_grade_records_the_result_but_changes_nothing_else() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;

        let outcome = h
            .runtime
            .grade_enrollment(
                &enrollment.id,
                ResultSheet {
                    kata: Some(LetterGrade::D),
                    kumite: Some(LetterGrade::F),
                    kihon: None,
                    final_grade: LetterGrade::F,
                    observations: String::new(),
                    present: true,
                },
            )
            .await
            .unwrap();
        assert!(!outcome.promoted);
        assert!(matches!(outcome.issuance, IssuanceStatus::NotAttempted));

        let student = h
            .runtime
            .get_student(&enrollment.student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.current_belt.as_str(), "Cinturón Amarillo");
        assert!(h
            .runtime
            .list_certificates(&enrollment.student_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn grading_twice_is_rejected_as_a_duplicate_result() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;

        h.runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await
            .unwrap();
        let second = h
            .runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await;
        assert!(matches!(
            second,
            Err(RuntimeError::Workflow(WorkflowError::DuplicateResult(_)))
        ));
    }

    #[tokio::test]
    async fn upload_failure_keeps_the_promotion_and_resumes_with_the_same_hash() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;
        h.blobs.set_fail_uploads(true);

        let outcome = h
            .runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await
            .unwrap();
        // Promotion is authoritative even though issuance could not finish.
        assert!(outcome.promoted);
        let IssuanceStatus::Unfinished {
            certificate_id,
            error,
        } = outcome.issuance
        else {
            panic!("expected unfinished issuance, got {:?}", outcome.issuance);
        };
        assert!(error.contains("upload"));
        let student = h
            .runtime
            .get_student(&enrollment.student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.current_belt.as_str(), "Cinturón Naranja");

        // The pending row survives with its issued_at; resuming after the
        // outage reproduces the fingerprint that issuance would have stored.
        h.blobs.set_fail_uploads(false);
        let certificate = h
            .runtime
            .resume_certificate(&certificate_id)
            .await
            .unwrap();
        let hash = certificate.hash.clone().unwrap();
        let artifact = h
            .blobs
            .download(certificate.pdf_url.as_deref().unwrap())
            .await
            .unwrap();
        assert!(String::from_utf8(artifact).unwrap().contains(&hash));

        // Resuming a complete certificate is a no-op returning the same row.
        let again = h
            .runtime
            .resume_certificate(&certificate_id)
            .await
            .unwrap();
        assert_eq!(again.hash, certificate.hash);
        assert_eq!(again.pdf_url, certificate.pdf_url);
    }

    #[tokio::test]
    async fn revoked_certificates_stay_revoked() {
        let h = harness();
        let (enrollment, sensei) = seed_enrollment(&h.runtime).await;
        let outcome = h
            .runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await
            .unwrap();
        let IssuanceStatus::Issued { certificate } = outcome.issuance else {
            panic!("expected an issued certificate");
        };

        let revoked = h
            .runtime
            .revoke_certificate(&certificate.id, Some(&sensei))
            .await
            .unwrap();
        assert_eq!(revoked.certificate.status, CertificateStatus::Revoked);
        assert!(h.ledger.anchored_hashes().is_empty());

        let validate_after = h
            .runtime
            .validate_certificate(&certificate.id, Some(&sensei))
            .await;
        assert!(validate_after.is_err());
    }

    #[tokio::test]
    async fn deactivated_students_cannot_enroll_but_keep_their_history() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;
        h.runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await
            .unwrap();

        let student = h
            .runtime
            .deactivate_student(&enrollment.student_id)
            .await
            .unwrap();
        assert!(!student.is_active);
        // Certificates remain queryable after deactivation.
        assert_eq!(
            h.runtime
                .list_certificates(&enrollment.student_id)
                .await
                .unwrap()
                .len(),
            1
        );

        let again = h
            .runtime
            .enroll(&enrollment.exam_id, &enrollment.student_id, None)
            .await;
        assert!(matches!(
            again,
            Err(RuntimeError::Workflow(WorkflowError::InactiveStudent(_)))
        ));
    }

    #[tokio::test]
    async fn promotion_can_be_redriven_after_the_result_was_recorded() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;

        // Record the result without the rest of the pipeline, as when the
        // conditional belt update loses to another writer and the grading
        // call errors after the result commits.
        let recorder = ResultRecorder::new(h.runtime.storage());
        recorder
            .record_result(&enrollment.id, passing_sheet())
            .await
            .unwrap();

        // The result is write-once, so re-grading is not the recovery path.
        let regrade = h
            .runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await;
        assert!(matches!(
            regrade,
            Err(RuntimeError::Workflow(WorkflowError::DuplicateResult(_)))
        ));

        let outcome = h.runtime.promote_enrollment(&enrollment.id).await.unwrap();
        assert!(outcome.promoted);
        let IssuanceStatus::Issued { certificate } = outcome.issuance else {
            panic!("expected an issued certificate, got {:?}", outcome.issuance);
        };
        let student = h
            .runtime
            .get_student(&enrollment.student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.current_belt.as_str(), "Cinturón Naranja");

        // Re-driving once more neither double-promotes nor issues a second
        // certificate.
        let again = h.runtime.promote_enrollment(&enrollment.id).await.unwrap();
        assert!(again.promoted);
        let IssuanceStatus::Issued { certificate: same } = again.issuance else {
            panic!("expected the already issued certificate");
        };
        assert_eq!(same.id, certificate.id);
        assert_eq!(
            h.runtime
                .list_certificates(&enrollment.student_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn redriving_promotion_without_a_recorded_result_is_rejected() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;
        let outcome = h.runtime.promote_enrollment(&enrollment.id).await;
        assert!(matches!(
            outcome,
            Err(RuntimeError::Workflow(WorkflowError::ResultNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn registering_a_student_provisions_a_login_account() {
        let h = harness();
        let dojo = h
            .runtime
            .register_dojo("Dojo Central", "Sevilla")
            .await
            .unwrap();
        let student = h
            .runtime
            .register_student("Ana Torres", &dojo.id, None)
            .await
            .unwrap();

        let calls = h.invoker.calls();
        assert_eq!(calls.len(), 1);
        let (name, payload) = &calls[0];
        assert_eq!(name, "provision_student_account");
        assert_eq!(payload["student_id"], student.id.to_string());
        assert_eq!(payload["name"], "Ana Torres");
    }

    #[tokio::test]
    async fn validation_without_an_explicit_validator_uses_the_session_identity() {
        let h = harness();
        let (enrollment, _) = seed_enrollment(&h.runtime).await;
        let outcome = h
            .runtime
            .grade_enrollment(&enrollment.id, passing_sheet())
            .await
            .unwrap();
        let IssuanceStatus::Issued { certificate } = outcome.issuance else {
            panic!("expected an issued certificate");
        };

        let validated = h
            .runtime
            .validate_certificate(&certificate.id, None)
            .await
            .unwrap();
        assert_eq!(
            validated
                .certificate
                .validated_by
                .as_ref()
                .map(|s| s.to_string())
                .as_deref(),
            Some("sensei-session")
        );
    }
}
