//! Storage abstractions for the obi workflow.
//!
//! This crate defines the persistence contract the workflow builds on:
//! - roster records (dojos, senseis, students)
//! - exam events and enrollments
//! - write-once exam results
//! - append-only certificates with a gated status transition
//!
//! Design stance:
//! - Uniqueness and conditional updates live *inside* the store, never in
//!   calling code, so they hold under concurrent submissions.
//! - The in-memory adapter is the deterministic reference implementation;
//!   PostgreSQL (feature `postgres`) is the transactional backend, where the
//!   same invariants are carried by UNIQUE constraints and guarded UPDATEs.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryDojoStorage, StateSnapshot};
pub use traits::{
    CertificateStore, DojoStorage, DojoStore, EnrollmentStore, ExamStore, NewCertificate,
    NewEnrollment, NewStudent, QueryWindow, ResultStore, SenseiStore, StudentStore,
};
