//! # Vault API Trait
//!
//! The seam between reconciliation logic and the Vault HTTP API. Endpoints
//! and resource contracts are written against this trait so tests can swap
//! in a recording mock, mirroring how the provider trait decouples the
//! reconciler from the cloud SDKs elsewhere in our controllers.
//!
//! Vault's API is uniform enough that four verbs cover every resource
//! family: mounts live under `sys/mounts` / `sys/auth`, audit devices under
//! `sys/audit`, policies under `sys/policies/acl`, and everything else is a
//! document at a path.

use async_trait::async_trait;

use super::error::VaultError;

/// A Vault request or response body: string keys to arbitrary JSON values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Minimal Vault surface consumed by the reconciliation engine.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Read the document at `path`. `Ok(None)` means the path is absent,
    /// which is a legitimate result, not an error.
    async fn read(&self, path: &str) -> Result<Option<Payload>, VaultError>;

    /// Write `payload` to `path`. Some endpoints (PKI generation, password
    /// policy generation) answer with a body; plain writes answer 204.
    async fn write(&self, path: &str, payload: &Payload) -> Result<Option<Payload>, VaultError>;

    /// Delete the document at `path`. Absence surfaces as
    /// [`VaultError::NotFound`]; tolerating it is the caller's decision.
    async fn delete(&self, path: &str) -> Result<(), VaultError>;

    /// List the keys under `path` (Vault `LIST` verb).
    async fn list(&self, path: &str) -> Result<Option<Payload>, VaultError>;
}

/// Convert a `serde_json::json!` object literal into a [`Payload`].
///
/// Panics when handed a non-object value, which is a programming error in
/// the payload builder, so this is restricted to crate-internal use.
pub(crate) fn payload_from(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => unreachable!("payload builders always produce objects, got {other}"),
    }
}
