//! Certificate issuance and validation.
//!
//! A certificate is a hash-fingerprinted, append-only ledger entry
//! evidencing a promotion:
//!
//! - [`hash`] — deterministic SHA-256 derivation over the identifying tuple
//! - [`CertificateIssuer`] — the five-step issuance pipeline, resumable by
//!   certificate id after a render or storage failure
//! - [`ValidationGate`] — the one-way pending → valid/revoked transition,
//!   with best-effort external anchoring

#![deny(unsafe_code)]

mod error;
pub mod gate;
pub mod hash;
pub mod issuer;

pub use error::CertificateError;
pub use gate::{ValidationGate, ValidationOutcome};
pub use hash::derive_hash;
pub use issuer::CertificateIssuer;
