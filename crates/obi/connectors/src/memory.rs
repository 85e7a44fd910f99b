//! In-memory adapters for the connector traits.
//!
//! Deterministic stand-ins used by tests and the CLI. The failure toggles
//! on the blob store and anchor ledger exist to exercise the workflow's
//! partial-failure and resume paths.

use crate::error::{AnchorError, BlobError, IdentityError, InvokeError, RenderError};
use crate::traits::{
    AnchorLedger, AnchorReceipt, BlobStore, CertificateFields, CertificateRenderer,
    FunctionInvoker, IdentityProvider, UserAccount,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Identity provider returning one fixed account.
pub struct StaticIdentityProvider {
    account: UserAccount,
}

impl StaticIdentityProvider {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            account: UserAccount {
                id: id.into(),
                email: email.into(),
            },
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_user(&self) -> Result<UserAccount, IdentityError> {
        Ok(self.account.clone())
    }
}

/// Blob store backed by a map, with a failure toggle for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent uploads fail until cleared.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, BlobError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::Upload("simulated upload failure".to_string()));
        }
        let mut guard = self
            .blobs
            .write()
            .map_err(|_| BlobError::Upload("blob lock poisoned".to_string()))?;
        let locator = format!("mem://{path}");
        guard.insert(locator.clone(), bytes);
        Ok(locator)
    }

    async fn download(&self, locator: &str) -> Result<Vec<u8>, BlobError> {
        let guard = self
            .blobs
            .read()
            .map_err(|_| BlobError::Download("blob lock poisoned".to_string()))?;
        guard
            .get(locator)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(locator.to_string()))
    }
}

/// Deterministic plain-text certificate renderer.
///
/// Real deployments render a PDF from a template; the layout is outside the
/// workflow's contract. What is binding: the output embeds the hash text at
/// a deterministic position, so the same fields always produce the same
/// bytes.
#[derive(Default)]
pub struct TextCertificateRenderer;

impl TextCertificateRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl CertificateRenderer for TextCertificateRenderer {
    fn render(&self, fields: &CertificateFields) -> Result<Vec<u8>, RenderError> {
        if fields.hash_hex.is_empty() {
            return Err(RenderError("certificate hash must not be empty".to_string()));
        }
        let document = format!(
            "CERTIFICADO DE GRADUACIÓN\n\
             =========================\n\
             Estudiante: {}\n\
             Grado obtenido: {}\n\
             Fecha de examen: {}\n\
             Sensei examinador: {}\n\
             \n\
             Huella SHA-256: {}\n",
            fields.student_name, fields.belt, fields.exam_date, fields.sensei_name, fields.hash_hex
        );
        Ok(document.into_bytes())
    }
}

/// Anchoring ledger backed by a map, with a failure toggle for tests.
#[derive(Default)]
pub struct MemoryAnchorLedger {
    anchored: RwLock<Vec<String>>,
    fail_calls: AtomicBool,
}

impl MemoryAnchorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent anchoring calls fail until cleared.
    pub fn set_fail_calls(&self, fail: bool) {
        self.fail_calls.store(fail, Ordering::SeqCst);
    }

    /// Hashes anchored so far, in call order.
    pub fn anchored_hashes(&self) -> Vec<String> {
        self.anchored.read().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnchorLedger for MemoryAnchorLedger {
    async fn register_certificate(&self, hash_hex: &str) -> Result<AnchorReceipt, AnchorError> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(AnchorError::Unreachable(
                "simulated ledger outage".to_string(),
            ));
        }
        let mut guard = self
            .anchored
            .write()
            .map_err(|_| AnchorError::Unreachable("ledger lock poisoned".to_string()))?;
        guard.push(hash_hex.to_string());
        Ok(AnchorReceipt {
            tx_id: format!("tx-{}", uuid::Uuid::new_v4()),
            anchored_at: Utc::now(),
        })
    }
}

/// Function invoker that records calls and returns an empty object.
#[derive(Default)]
pub struct RecordingFunctionInvoker {
    calls: RwLock<Vec<(String, serde_json::Value)>>,
}

impl RecordingFunctionInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.read().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FunctionInvoker for RecordingFunctionInvoker {
    async fn invoke(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, InvokeError> {
        let mut guard = self.calls.write().map_err(|_| InvokeError {
            name: name.to_string(),
            message: "invoker lock poisoned".to_string(),
        })?;
        guard.push((name.to_string(), payload));
        Ok(serde_json::json!({}))
    }
}
