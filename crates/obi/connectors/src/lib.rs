//! External collaborator interfaces for the obi workflow.
//!
//! The managed backend the dojo application runs against (auth, blob
//! storage, serverless functions) and the external anchoring ledger are not
//! reimplemented here. Each is consumed through a narrow trait:
//!
//! - [`IdentityProvider`] — who is the acting sensei/validator
//! - [`BlobStore`] — durable artifact storage
//! - [`CertificateRenderer`] — pure certificate-document transform
//! - [`AnchorLedger`] — best-effort hash anchoring
//! - [`FunctionInvoker`] — elevated-privilege operations (account provisioning)
//!
//! The in-memory adapters in [`memory`] back the tests; [`fs::FileBlobStore`]
//! gives the CLI a durable artifact store.

#![deny(unsafe_code)]

mod error;
pub mod fs;
pub mod memory;
mod traits;

pub use error::{AnchorError, BlobError, IdentityError, InvokeError, RenderError};
pub use fs::FileBlobStore;
pub use memory::{
    MemoryAnchorLedger, MemoryBlobStore, RecordingFunctionInvoker, StaticIdentityProvider,
    TextCertificateRenderer,
};
pub use traits::{
    AnchorLedger, AnchorReceipt, BlobStore, CertificateFields, CertificateRenderer,
    FunctionInvoker, IdentityProvider, UserAccount,
};
