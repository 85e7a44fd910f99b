//! The belt-progression workflow: enrollment, grading, approval, promotion.
//!
//! Four explicit, independently testable steps, connected by return values
//! rather than implicit chaining:
//!
//! 1. [`EnrollmentRegistry`] — records a student's intent to attempt a grade
//!    at an exam, defaulting to the next rung on the belt ladder.
//! 2. [`ResultRecorder`] — records the graded components for one enrollment,
//!    exactly once.
//! 3. [`approval`] — the pure policy mapping a final grade to
//!    approved/rejected.
//! 4. [`PromotionApplier`] — on approval, advances the student's belt with a
//!    regression guard and per-student serialization.
//!
//! Certificate issuance is a separate concern (`obi-certificate`), chained
//! by the runtime facade after a successful promotion.

#![deny(unsafe_code)]

pub mod approval;
pub mod enrollment;
mod error;
pub mod promotion;
pub mod results;

pub use approval::is_approved;
pub use enrollment::{EnrollmentRegistry, GradePolicy};
pub use error::WorkflowError;
pub use promotion::{Promotion, PromotionApplier};
pub use results::{ResultRecorder, ResultSheet};
