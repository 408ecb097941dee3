//! # Resource Contract
//!
//! The capability set every reconcilable Vault resource implements: where
//! it lives (`path`), what it should look like (`payload`), whether an
//! observed document already matches (`is_equivalent`), and a `prepare`
//! hook that resolves computed values (referenced secrets, accessors,
//! namespace selectors) before any backend call.
//!
//! Specialized families refine this contract: see
//! [`super::endpoint::engine::EngineResource`],
//! [`super::endpoint::pki::PkiResource`] and
//! [`super::endpoint::audit::AuditResource`].

use async_trait::async_trait;

use super::api::{Payload, VaultApi};
use super::error::VaultError;
use crate::crd::NamespaceSelector;

/// Request-scoped dependencies handed to `prepare` and the endpoints.
///
/// Everything a reconcile needs travels through this struct by
/// parameter: the backend handle, the Vault namespace in effect, and a
/// narrow reader over collaborator objects in the cluster.
pub struct ReconcileContext<'a> {
    pub vault: &'a dyn VaultApi,
    pub reader: &'a dyn CollaboratorReader,
    pub vault_namespace: Option<&'a str>,
}

impl std::fmt::Debug for ReconcileContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext")
            .field("vault_namespace", &self.vault_namespace)
            .finish_non_exhaustive()
    }
}

/// Narrow read-only view of collaborator objects in the control plane.
///
/// `prepare` implementations resolve referenced credentials, accessors and
/// namespace fan-out through this trait; tests substitute an in-memory map.
#[async_trait]
pub trait CollaboratorReader: Send + Sync {
    /// One key of a Kubernetes Secret, decoded to UTF-8.
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> anyhow::Result<Option<String>>;

    /// The backend-assigned accessor recorded on a SecretsEngine's status.
    /// Accessors are always round-tripped from the backend, never derived.
    async fn engine_accessor(&self, namespace: &str, name: &str)
        -> anyhow::Result<Option<String>>;

    /// Names of namespaces matching a label selector.
    async fn namespaces_matching(&self, selector: &NamespaceSelector)
        -> anyhow::Result<Vec<String>>;
}

/// The generic Resource Contract.
#[async_trait]
pub trait VaultResource: Send + Sync {
    /// Backend path of the document this resource owns.
    fn path(&self) -> String;

    /// Desired document at [`Self::path`]. Only valid after `prepare` ran.
    fn payload(&self) -> Payload;

    /// Whether an observed document is equivalent to the desired payload.
    ///
    /// Comparison semantics are per resource type, derived from what the
    /// backend actually echoes back (TTLs come back as seconds, passwords
    /// never come back at all). A malformed observed document is an error,
    /// not a mismatch.
    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError>;

    /// Whether the resource carries everything needed to reconcile.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Whether backend cleanup applies on deletion. Resources with a
    /// retain policy report false and skip cleanup entirely.
    fn is_deletable(&self) -> bool {
        true
    }

    /// Resolve computed/internal values before any backend call: referenced
    /// secrets, accessor substitutions, selector fan-out, generated values.
    async fn prepare(&mut self, _ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}
