//! Domain types for the obi belt-progression workflow.
//!
//! This crate holds the vocabulary shared by every other obi crate:
//!
//! - [`BeltLadder`] — the ordered, immutable grade sequence
//! - [`LetterGrade`] — the fixed ordinal set used to score exam components
//! - Roster and certification records ([`Student`], [`Exam`], [`Enrollment`],
//!   [`ExamResult`], [`Certificate`])
//!
//! Records here are plain data. Lifecycle rules (write-once results, the
//! pending/valid/revoked certificate transitions, conditional belt updates)
//! are enforced by `obi-storage` and the workflow crates on top of it.

#![deny(unsafe_code)]

pub mod grade;
pub mod id;
pub mod ladder;
pub mod record;

pub use grade::{GradeParseError, LetterGrade};
pub use id::{CertificateId, DojoId, EnrollmentId, ExamId, SenseiId, StudentId};
pub use ladder::{BeltLadder, GradeLabel, LadderError};
pub use record::{
    Certificate, CertificateStatus, Dojo, Enrollment, Exam, ExamResult, Sensei, Student,
};
