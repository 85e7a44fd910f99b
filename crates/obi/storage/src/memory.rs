//! In-memory reference implementation for the obi storage traits.
//!
//! Deterministic and test-friendly. Production deployments should use the
//! PostgreSQL adapter, where the same invariants are carried by UNIQUE
//! constraints and guarded UPDATEs.

use crate::traits::{
    CertificateStore, DojoStore, EnrollmentStore, ExamStore, NewCertificate, NewEnrollment,
    NewStudent, QueryWindow, ResultStore, SenseiStore, StudentStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use obi_types::{
    Certificate, CertificateId, CertificateStatus, Dojo, DojoId, Enrollment, EnrollmentId, Exam,
    ExamId, ExamResult, GradeLabel, Sensei, SenseiId, Student, StudentId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory obi storage adapter.
#[derive(Default)]
pub struct InMemoryDojoStorage {
    dojos: RwLock<HashMap<DojoId, Dojo>>,
    senseis: RwLock<HashMap<SenseiId, Sensei>>,
    students: RwLock<HashMap<StudentId, Student>>,
    exams: RwLock<HashMap<ExamId, Exam>>,
    enrollments: RwLock<HashMap<EnrollmentId, Enrollment>>,
    /// Secondary index backing the (exam, student) uniqueness constraint.
    enrollment_pairs: RwLock<HashMap<(ExamId, StudentId), EnrollmentId>>,
    results: RwLock<HashMap<EnrollmentId, ExamResult>>,
    certificates: RwLock<HashMap<CertificateId, Certificate>>,
}

/// Serializable dump of the full store, used by the CLI state file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub dojos: Vec<Dojo>,
    pub senseis: Vec<Sensei>,
    pub students: Vec<Student>,
    pub exams: Vec<Exam>,
    pub enrollments: Vec<Enrollment>,
    pub results: Vec<ExamResult>,
    pub certificates: Vec<Certificate>,
}

impl InMemoryDojoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the full store contents, sorted by id for stable output.
    pub fn snapshot(&self) -> StorageResult<StateSnapshot> {
        let mut snapshot = StateSnapshot {
            dojos: read(&self.dojos)?.values().cloned().collect(),
            senseis: read(&self.senseis)?.values().cloned().collect(),
            students: read(&self.students)?.values().cloned().collect(),
            exams: read(&self.exams)?.values().cloned().collect(),
            enrollments: read(&self.enrollments)?.values().cloned().collect(),
            results: read(&self.results)?.values().cloned().collect(),
            certificates: read(&self.certificates)?.values().cloned().collect(),
        };
        snapshot.dojos.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.senseis.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.students.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.exams.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.enrollments.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
            .results
            .sort_by(|a, b| a.enrollment_id.cmp(&b.enrollment_id));
        snapshot.certificates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshot)
    }

    /// Build a store from a previously exported snapshot.
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let mut enrollments = HashMap::new();
        let mut pairs = HashMap::new();
        for enrollment in snapshot.enrollments {
            pairs.insert(
                (enrollment.exam_id.clone(), enrollment.student_id.clone()),
                enrollment.id.clone(),
            );
            enrollments.insert(enrollment.id.clone(), enrollment);
        }
        Self {
            dojos: RwLock::new(
                snapshot
                    .dojos
                    .into_iter()
                    .map(|d| (d.id.clone(), d))
                    .collect(),
            ),
            senseis: RwLock::new(
                snapshot
                    .senseis
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect(),
            ),
            students: RwLock::new(
                snapshot
                    .students
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect(),
            ),
            exams: RwLock::new(
                snapshot
                    .exams
                    .into_iter()
                    .map(|e| (e.id.clone(), e))
                    .collect(),
            ),
            enrollments: RwLock::new(enrollments),
            enrollment_pairs: RwLock::new(pairs),
            results: RwLock::new(
                snapshot
                    .results
                    .into_iter()
                    .map(|r| (r.enrollment_id.clone(), r))
                    .collect(),
            ),
            certificates: RwLock::new(
                snapshot
                    .certificates
                    .into_iter()
                    .map(|c| (c.id.clone(), c))
                    .collect(),
            ),
        }
    }
}

fn read<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
) -> StorageResult<std::sync::RwLockReadGuard<'a, HashMap<K, V>>> {
    lock.read()
        .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
}

fn write<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
) -> StorageResult<std::sync::RwLockWriteGuard<'a, HashMap<K, V>>> {
    lock.write()
        .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[async_trait]
impl DojoStore for InMemoryDojoStorage {
    async fn insert_dojo(&self, dojo: Dojo) -> StorageResult<()> {
        let mut guard = write(&self.dojos)?;
        if guard.contains_key(&dojo.id) {
            return Err(StorageError::Conflict(format!(
                "dojo {} already exists",
                dojo.id
            )));
        }
        guard.insert(dojo.id.clone(), dojo);
        Ok(())
    }

    async fn get_dojo(&self, id: &DojoId) -> StorageResult<Option<Dojo>> {
        Ok(read(&self.dojos)?.get(id).cloned())
    }

    async fn list_dojos(&self, window: QueryWindow) -> StorageResult<Vec<Dojo>> {
        let mut values = read(&self.dojos)?.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl SenseiStore for InMemoryDojoStorage {
    async fn insert_sensei(&self, sensei: Sensei) -> StorageResult<()> {
        let mut guard = write(&self.senseis)?;
        if guard.contains_key(&sensei.id) {
            return Err(StorageError::Conflict(format!(
                "sensei {} already exists",
                sensei.id
            )));
        }
        guard.insert(sensei.id.clone(), sensei);
        Ok(())
    }

    async fn get_sensei(&self, id: &SenseiId) -> StorageResult<Option<Sensei>> {
        Ok(read(&self.senseis)?.get(id).cloned())
    }

    async fn list_senseis(&self, window: QueryWindow) -> StorageResult<Vec<Sensei>> {
        let mut values = read(&self.senseis)?.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl StudentStore for InMemoryDojoStorage {
    async fn insert_student(&self, student: NewStudent) -> StorageResult<Student> {
        let mut guard = write(&self.students)?;
        if guard.contains_key(&student.id) {
            return Err(StorageError::Conflict(format!(
                "student {} already exists",
                student.id
            )));
        }
        let now = Utc::now();
        let record = Student {
            id: student.id.clone(),
            name: student.name,
            dojo_id: student.dojo_id,
            current_belt: student.current_belt,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        guard.insert(student.id, record.clone());
        Ok(record)
    }

    async fn get_student(&self, id: &StudentId) -> StorageResult<Option<Student>> {
        Ok(read(&self.students)?.get(id).cloned())
    }

    async fn update_student_belt(
        &self,
        id: &StudentId,
        expected_belt: &GradeLabel,
        new_belt: &GradeLabel,
    ) -> StorageResult<Student> {
        let mut guard = write(&self.students)?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("student {id} not found")))?;
        if &record.current_belt != expected_belt {
            return Err(StorageError::Conflict(format!(
                "student {id} belt changed concurrently: expected '{expected_belt}', found '{}'",
                record.current_belt
            )));
        }
        record.current_belt = new_belt.clone();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_student_active(&self, id: &StudentId, is_active: bool) -> StorageResult<Student> {
        let mut guard = write(&self.students)?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("student {id} not found")))?;
        record.is_active = is_active;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_students(
        &self,
        dojo: &DojoId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Student>> {
        let mut values = read(&self.students)?
            .values()
            .filter(|s| &s.dojo_id == dojo)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl ExamStore for InMemoryDojoStorage {
    async fn insert_exam(&self, exam: Exam) -> StorageResult<()> {
        let mut guard = write(&self.exams)?;
        if guard.contains_key(&exam.id) {
            return Err(StorageError::Conflict(format!(
                "exam {} already exists",
                exam.id
            )));
        }
        guard.insert(exam.id.clone(), exam);
        Ok(())
    }

    async fn get_exam(&self, id: &ExamId) -> StorageResult<Option<Exam>> {
        Ok(read(&self.exams)?.get(id).cloned())
    }

    async fn list_exams_on(&self, date: NaiveDate) -> StorageResult<Vec<Exam>> {
        let mut values = read(&self.exams)?
            .values()
            .filter(|e| e.date == date)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(values)
    }

    async fn list_exams(&self, window: QueryWindow) -> StorageResult<Vec<Exam>> {
        let mut values = read(&self.exams)?.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryDojoStorage {
    async fn insert_enrollment(&self, enrollment: NewEnrollment) -> StorageResult<Enrollment> {
        // Pair index is taken first and held across the insert so two
        // concurrent submissions cannot both pass the uniqueness check.
        let mut pairs = self
            .enrollment_pairs
            .write()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
        let key = (enrollment.exam_id.clone(), enrollment.student_id.clone());
        if pairs.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "student {} is already enrolled in exam {}",
                enrollment.student_id, enrollment.exam_id
            )));
        }
        let record = Enrollment {
            id: enrollment.id.clone(),
            exam_id: enrollment.exam_id,
            student_id: enrollment.student_id,
            belt: enrollment.belt,
            created_at: Utc::now(),
        };
        let mut guard = write(&self.enrollments)?;
        pairs.insert(key, record.id.clone());
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_enrollment(&self, id: &EnrollmentId) -> StorageResult<Option<Enrollment>> {
        Ok(read(&self.enrollments)?.get(id).cloned())
    }

    async fn find_enrollment(
        &self,
        exam_id: &ExamId,
        student_id: &StudentId,
    ) -> StorageResult<Option<Enrollment>> {
        let pairs = self
            .enrollment_pairs
            .read()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
        let Some(enrollment_id) = pairs.get(&(exam_id.clone(), student_id.clone())) else {
            return Ok(None);
        };
        Ok(read(&self.enrollments)?.get(enrollment_id).cloned())
    }

    async fn list_enrollments_for_exam(&self, exam_id: &ExamId) -> StorageResult<Vec<Enrollment>> {
        let mut values = read(&self.enrollments)?
            .values()
            .filter(|e| &e.exam_id == exam_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn list_enrollments_for_student(
        &self,
        student_id: &StudentId,
    ) -> StorageResult<Vec<Enrollment>> {
        let mut values = read(&self.enrollments)?
            .values()
            .filter(|e| &e.student_id == student_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }
}

#[async_trait]
impl ResultStore for InMemoryDojoStorage {
    async fn insert_result(&self, result: ExamResult) -> StorageResult<ExamResult> {
        let mut guard = write(&self.results)?;
        if guard.contains_key(&result.enrollment_id) {
            return Err(StorageError::Conflict(format!(
                "a result already exists for enrollment {}",
                result.enrollment_id
            )));
        }
        guard.insert(result.enrollment_id.clone(), result.clone());
        Ok(result)
    }

    async fn get_result(&self, enrollment_id: &EnrollmentId) -> StorageResult<Option<ExamResult>> {
        Ok(read(&self.results)?.get(enrollment_id).cloned())
    }
}

#[async_trait]
impl CertificateStore for InMemoryDojoStorage {
    async fn insert_certificate(&self, certificate: NewCertificate) -> StorageResult<Certificate> {
        let mut guard = write(&self.certificates)?;
        if guard.contains_key(&certificate.id) {
            return Err(StorageError::Conflict(format!(
                "certificate {} already exists",
                certificate.id
            )));
        }
        let record = Certificate {
            id: certificate.id.clone(),
            student_id: certificate.student_id,
            exam_id: certificate.exam_id,
            belt: certificate.belt,
            status: CertificateStatus::Pending,
            hash: None,
            pdf_url: None,
            issued_at: Utc::now(),
            validated_at: None,
            validated_by: None,
        };
        guard.insert(certificate.id, record.clone());
        Ok(record)
    }

    async fn get_certificate(&self, id: &CertificateId) -> StorageResult<Option<Certificate>> {
        Ok(read(&self.certificates)?.get(id).cloned())
    }

    async fn complete_issuance(
        &self,
        id: &CertificateId,
        hash: &str,
        pdf_url: &str,
    ) -> StorageResult<Certificate> {
        let mut guard = write(&self.certificates)?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("certificate {id} not found")))?;
        match (&record.hash, &record.pdf_url) {
            (None, None) => {
                record.hash = Some(hash.to_string());
                record.pdf_url = Some(pdf_url.to_string());
                Ok(record.clone())
            }
            (Some(existing_hash), Some(existing_url))
                if existing_hash == hash && existing_url == pdf_url =>
            {
                // Idempotent resume: identical completion is a no-op.
                Ok(record.clone())
            }
            _ => Err(StorageError::Conflict(format!(
                "certificate {id} issuance already completed with different values"
            ))),
        }
    }

    async fn finalize_certificate(
        &self,
        id: &CertificateId,
        status: CertificateStatus,
        validated_by: &SenseiId,
        validated_at: DateTime<Utc>,
    ) -> StorageResult<Certificate> {
        if !status.is_terminal() {
            return Err(StorageError::InvalidInput(
                "finalize_certificate requires a terminal status".to_string(),
            ));
        }
        let mut guard = write(&self.certificates)?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("certificate {id} not found")))?;
        if record.status.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "certificate {id} is already {}",
                record.status
            )));
        }
        record.status = status;
        record.validated_at = Some(validated_at);
        record.validated_by = Some(validated_by.clone());
        Ok(record.clone())
    }

    async fn list_certificates_for_student(
        &self,
        student_id: &StudentId,
    ) -> StorageResult<Vec<Certificate>> {
        let mut values = read(&self.certificates)?
            .values()
            .filter(|c| &c.student_id == student_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_student(id: &str, belt: &str) -> NewStudent {
        NewStudent {
            id: StudentId::new(id),
            name: "Ana Torres".to_string(),
            dojo_id: DojoId::new("dojo-1"),
            current_belt: GradeLabel::from(belt),
        }
    }

    fn sample_enrollment(id: &str, exam: &str, student: &str) -> NewEnrollment {
        NewEnrollment {
            id: EnrollmentId::new(id),
            exam_id: ExamId::new(exam),
            student_id: StudentId::new(student),
            belt: GradeLabel::from("Cinturón Naranja"),
        }
    }

    #[tokio::test]
    async fn duplicate_enrollment_pairs_are_rejected() {
        let storage = InMemoryDojoStorage::new();
        storage
            .insert_enrollment(sample_enrollment("enrollment-1", "exam-1", "student-1"))
            .await
            .unwrap();
        let second = storage
            .insert_enrollment(sample_enrollment("enrollment-2", "exam-1", "student-1"))
            .await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));

        // Same student, different exam is fine.
        storage
            .insert_enrollment(sample_enrollment("enrollment-3", "exam-2", "student-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn results_are_write_once() {
        let storage = InMemoryDojoStorage::new();
        let result = ExamResult {
            enrollment_id: EnrollmentId::new("enrollment-1"),
            kata: Some(obi_types::LetterGrade::A),
            kumite: Some(obi_types::LetterGrade::B),
            kihon: Some(obi_types::LetterGrade::A),
            final_grade: obi_types::LetterGrade::AMinus,
            observations: String::new(),
            present: true,
            recorded_at: Utc::now(),
        };
        storage.insert_result(result.clone()).await.unwrap();
        let second = storage.insert_result(result).await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn belt_update_is_conditional_on_expected_value() {
        let storage = InMemoryDojoStorage::new();
        storage
            .insert_student(sample_student("student-1", "Cinturón Amarillo"))
            .await
            .unwrap();

        let stale = storage
            .update_student_belt(
                &StudentId::new("student-1"),
                &GradeLabel::from("Cinturón Blanco"),
                &GradeLabel::from("Cinturón Naranja"),
            )
            .await;
        assert!(matches!(stale, Err(StorageError::Conflict(_))));

        let updated = storage
            .update_student_belt(
                &StudentId::new("student-1"),
                &GradeLabel::from("Cinturón Amarillo"),
                &GradeLabel::from("Cinturón Naranja"),
            )
            .await
            .unwrap();
        assert_eq!(updated.current_belt.as_str(), "Cinturón Naranja");
    }

    #[tokio::test]
    async fn certificate_completion_is_idempotent_but_refuses_new_values() {
        let storage = InMemoryDojoStorage::new();
        let cert = storage
            .insert_certificate(NewCertificate {
                id: CertificateId::new("certificate-1"),
                student_id: StudentId::new("student-1"),
                exam_id: ExamId::new("exam-1"),
                belt: GradeLabel::from("Cinturón Verde"),
            })
            .await
            .unwrap();
        assert_eq!(cert.status, CertificateStatus::Pending);
        assert!(cert.hash.is_none());

        storage
            .complete_issuance(&cert.id, "deadbeef", "mem://cert.pdf")
            .await
            .unwrap();
        // Identical retry is accepted.
        storage
            .complete_issuance(&cert.id, "deadbeef", "mem://cert.pdf")
            .await
            .unwrap();
        // Divergent retry is a conflict.
        let divergent = storage
            .complete_issuance(&cert.id, "cafebabe", "mem://other.pdf")
            .await;
        assert!(matches!(divergent, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn finalize_rejects_terminal_certificates() {
        let storage = InMemoryDojoStorage::new();
        let cert = storage
            .insert_certificate(NewCertificate {
                id: CertificateId::new("certificate-1"),
                student_id: StudentId::new("student-1"),
                exam_id: ExamId::new("exam-1"),
                belt: GradeLabel::from("Cinturón Verde"),
            })
            .await
            .unwrap();

        let validator = SenseiId::new("sensei-1");
        let validated = storage
            .finalize_certificate(&cert.id, CertificateStatus::Valid, &validator, Utc::now())
            .await
            .unwrap();
        assert_eq!(validated.status, CertificateStatus::Valid);
        assert!(validated.validated_at.is_some());

        let again = storage
            .finalize_certificate(&cert.id, CertificateStatus::Revoked, &validator, Utc::now())
            .await;
        assert!(matches!(again, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn snapshot_round_trips_the_store() {
        let storage = InMemoryDojoStorage::new();
        storage
            .insert_student(sample_student("student-1", "Cinturón Blanco"))
            .await
            .unwrap();
        storage
            .insert_enrollment(sample_enrollment("enrollment-1", "exam-1", "student-1"))
            .await
            .unwrap();

        let snapshot = storage.snapshot().unwrap();
        let restored = InMemoryDojoStorage::from_snapshot(snapshot);

        assert!(restored
            .get_student(&StudentId::new("student-1"))
            .await
            .unwrap()
            .is_some());
        // The pair index must be rebuilt too.
        let duplicate = restored
            .insert_enrollment(sample_enrollment("enrollment-9", "exam-1", "student-1"))
            .await;
        assert!(matches!(duplicate, Err(StorageError::Conflict(_))));
    }
}
