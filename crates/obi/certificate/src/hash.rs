//! Deterministic certificate hash derivation.
//!
//! The fingerprint binds the identifying tuple (student, exam, belt) to the
//! server-assigned `issued_at`, so reissuing the same tuple at a different
//! time yields a different hash, while retrying the artifact pipeline for
//! one row reproduces the identical hash.

use chrono::{DateTime, SecondsFormat, Utc};
use obi_types::{ExamId, GradeLabel, StudentId};
use sha2::{Digest, Sha256};

/// Derive the certificate fingerprint.
///
/// Canonical encoding, fixed for the lifetime of issued certificates so
/// holders can re-verify independently: the four fields joined by `:`, the
/// timestamp as RFC 3339 UTC with microsecond precision and a `Z` suffix,
/// hashed with SHA-256 and rendered as lowercase hex.
pub fn derive_hash(
    student_id: &StudentId,
    exam_id: &ExamId,
    belt: &GradeLabel,
    issued_at: DateTime<Utc>,
) -> String {
    let canonical = format!(
        "{}:{}:{}:{}",
        student_id.as_str(),
        exam_id.as_str(),
        belt.as_str(),
        issued_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    );
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tuple() -> (StudentId, ExamId, GradeLabel) {
        (
            StudentId::new("student-1"),
            ExamId::new("exam-1"),
            GradeLabel::from("Cinturón Naranja"),
        )
    }

    #[test]
    fn derivation_is_deterministic() {
        let (student, exam, belt) = tuple();
        let at = Utc.with_ymd_and_hms(2025, 6, 14, 10, 30, 0).unwrap();
        assert_eq!(
            derive_hash(&student, &exam, &belt, at),
            derive_hash(&student, &exam, &belt, at)
        );
    }

    #[test]
    fn distinct_issued_at_produces_distinct_hashes() {
        let (student, exam, belt) = tuple();
        let first = Utc.with_ymd_and_hms(2025, 6, 14, 10, 30, 0).unwrap();
        let second = first + chrono::Duration::microseconds(1);
        assert_ne!(
            derive_hash(&student, &exam, &belt, first),
            derive_hash(&student, &exam, &belt, second)
        );
    }

    #[test]
    fn every_tuple_field_contributes() {
        let (student, exam, belt) = tuple();
        let at = Utc.with_ymd_and_hms(2025, 6, 14, 10, 30, 0).unwrap();
        let base = derive_hash(&student, &exam, &belt, at);
        assert_ne!(
            base,
            derive_hash(&StudentId::new("student-2"), &exam, &belt, at)
        );
        assert_ne!(base, derive_hash(&student, &ExamId::new("exam-2"), &belt, at));
        assert_ne!(
            base,
            derive_hash(&student, &exam, &GradeLabel::from("Cinturón Verde"), at)
        );
    }

    #[test]
    fn output_is_lowercase_hex_sha256() {
        let (student, exam, belt) = tuple();
        let at = Utc.with_ymd_and_hms(2025, 6, 14, 10, 30, 0).unwrap();
        let hash = derive_hash(&student, &exam, &belt, at);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
