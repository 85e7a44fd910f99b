//! Identifier newtypes for roster and certification records.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), uuid::Uuid::new_v4()))
            }

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a student.
    StudentId,
    "student"
);
define_id!(
    /// Unique identifier for a sensei.
    SenseiId,
    "sensei"
);
define_id!(
    /// Unique identifier for a dojo.
    DojoId,
    "dojo"
);
define_id!(
    /// Unique identifier for an exam event.
    ExamId,
    "exam"
);
define_id!(
    /// Unique identifier for an enrollment (one student attempting one exam).
    EnrollmentId,
    "enrollment"
);
define_id!(
    /// Unique identifier for an issued certificate.
    CertificateId,
    "certificate"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = StudentId::generate();
        let b = StudentId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("student-"));
    }

    #[test]
    fn ids_round_trip_through_serde_as_plain_strings() {
        let id = CertificateId::new("certificate-fixed");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"certificate-fixed\"");
        let back: CertificateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
