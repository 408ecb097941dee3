//! # PKI Engine Endpoint
//!
//! State machine for certificate authority engines: mount, generate the
//! CA (optionally exporting its key), sign intermediates against a parent
//! CA, and keep the URL/CRL configuration documents converged.
//!
//! Generation is deliberately not idempotent from the controller's point
//! of view: regenerating a CA would invalidate every certificate issued
//! under it, so each provisioning stage is gated by a persisted one-way
//! state and a new CA requires deleting and recreating the resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::vault::api::{Payload, VaultApi};
use crate::vault::error::VaultError;

use super::engine::{EngineEndpoint, EngineResource};
use super::generic::WriteOutcome;

/// One-way provisioning progression of a PKI engine.
///
/// Ordering is significant: a stage can only ever advance. `Signed`
/// without `Generated` is unrepresentable, and reconciliation never moves
/// a resource backwards.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum PkiProvisioningState {
    #[default]
    Unstarted,
    Generated,
    Exported,
    Signed,
}

impl PkiProvisioningState {
    /// Whether the CA material has been generated (in any later stage).
    #[must_use]
    pub fn is_generated(&self) -> bool {
        *self >= PkiProvisioningState::Generated
    }

    /// Whether the intermediate has been signed by its parent.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        *self >= PkiProvisioningState::Signed
    }
}

/// Capabilities of a PKI engine, refining the engine contract.
pub trait PkiResource: EngineResource {
    /// Current provisioning stage, persisted on the resource.
    fn provisioning_state(&self) -> PkiProvisioningState;

    /// Advance to a later stage. Implementations never regress.
    fn advance_state(&mut self, next: PkiProvisioningState);

    /// Whether this engine is an intermediate CA requiring a signature.
    fn is_intermediate(&self) -> bool;

    /// Whether the private key should be exported at generation time.
    fn wants_export(&self) -> bool;

    /// Generation endpoint, e.g. `<mount>/root/generate/internal`.
    fn generate_path(&self) -> String;

    fn generate_payload(&self) -> Payload;

    /// Persist generation output (certificate or CSR, exported key).
    fn record_generated(&mut self, response: &Payload);

    /// Parent CA's `root/sign-intermediate` endpoint.
    fn sign_request_path(&self) -> Option<String>;

    /// Payload for the signing request, carrying the recorded CSR.
    fn sign_request_payload(&self) -> Result<Payload, VaultError>;

    /// Persist the signed certificate returned by the parent.
    fn record_signed(&mut self, response: &Payload);

    /// Own `intermediate/set-signed` endpoint.
    fn set_signed_path(&self) -> String;

    /// Payload installing the signed certificate into this engine.
    fn set_signed_payload(&self) -> Result<Payload, VaultError>;

    /// Desired `config/urls` document, if the spec sets one.
    fn urls_payload(&self) -> Option<Payload>;

    /// Desired `config/crl` document, if the spec sets one.
    fn crl_payload(&self) -> Option<Payload>;

    /// Vault mount path of the engine (without the `sys/mounts/` prefix).
    fn engine_mount(&self) -> String;
}

/// Endpoint implementing the PKI provisioning state machine.
pub struct PkiEndpoint<'a> {
    vault: &'a dyn VaultApi,
    engine: EngineEndpoint<'a>,
}

impl std::fmt::Debug for PkiEndpoint<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkiEndpoint").finish_non_exhaustive()
    }
}

impl<'a> PkiEndpoint<'a> {
    #[must_use]
    pub fn new(vault: &'a dyn VaultApi) -> Self {
        Self {
            vault,
            engine: EngineEndpoint::new(vault),
        }
    }

    /// Run every applicable stage for the current reconcile.
    ///
    /// Mounting, generation and signing are each gated; the URL and CRL
    /// configuration documents are converged on every pass regardless of
    /// provisioning progress.
    pub async fn reconcile(
        &self,
        resource: &mut dyn PkiResource,
    ) -> Result<WriteOutcome, VaultError> {
        let mut wrote = if self.engine.exists(resource).await? {
            WriteOutcome::Unchanged
        } else {
            self.engine.create(resource).await?;
            WriteOutcome::Created
        };

        if resource.provisioning_state() == PkiProvisioningState::Unstarted {
            let response = self
                .vault
                .write(&resource.generate_path(), &resource.generate_payload())
                .await?
                .unwrap_or_default();
            resource.record_generated(&response);
            resource.advance_state(PkiProvisioningState::Generated);
            if resource.wants_export() {
                // The exported key came back with the generate response and
                // was recorded above; mark the stage so it is never re-run.
                resource.advance_state(PkiProvisioningState::Exported);
            }
            wrote = WriteOutcome::Created;
        }

        if resource.is_intermediate()
            && resource.provisioning_state().is_generated()
            && !resource.provisioning_state().is_signed()
        {
            let sign_path = resource.sign_request_path().ok_or_else(|| {
                VaultError::malformed(
                    &resource.path(),
                    "intermediate engine without a parent signing endpoint",
                )
            })?;
            let response = self
                .vault
                .write(&sign_path, &resource.sign_request_payload()?)
                .await?
                .unwrap_or_default();
            resource.record_signed(&response);
            self.vault
                .write(&resource.set_signed_path(), &resource.set_signed_payload()?)
                .await?;
            resource.advance_state(PkiProvisioningState::Signed);
            wrote = WriteOutcome::Created;
        }

        let urls_path = format!("{}/config/urls", resource.engine_mount());
        if let Some(desired) = resource.urls_payload() {
            if self.converge_config(&urls_path, &desired).await? {
                wrote = WriteOutcome::Updated;
            }
        }

        let crl_path = format!("{}/config/crl", resource.engine_mount());
        if let Some(desired) = resource.crl_payload() {
            if self.converge_config(&crl_path, &desired).await? {
                wrote = WriteOutcome::Updated;
            }
        }

        Ok(wrote)
    }

    /// Read-compare-write for one configuration sub-document. Returns
    /// whether a write happened.
    async fn converge_config(&self, path: &str, desired: &Payload) -> Result<bool, VaultError> {
        let write_needed = match self.vault.read(path).await? {
            Some(observed) => !config_equivalent(desired, &observed),
            None => true,
        };
        if write_needed {
            self.vault.write(path, desired).await?;
        }
        Ok(write_needed)
    }

    /// Delete the engine mount; absence is success.
    pub async fn delete_if_exists(&self, resource: &dyn PkiResource) -> Result<(), VaultError> {
        self.engine.delete_if_exists(resource).await
    }
}

/// Field-wise comparison of a desired config document against what Vault
/// reported. Only fields the spec sets participate; Vault normalizes list
/// values, so arrays compare order-insensitively.
fn config_equivalent(desired: &Payload, observed: &Payload) -> bool {
    desired.iter().all(|(key, want)| match observed.get(key) {
        Some(have) => match (want, have) {
            (serde_json::Value::Array(w), serde_json::Value::Array(h)) => {
                let mut w: Vec<String> = w.iter().map(ToString::to_string).collect();
                let mut h: Vec<String> = h.iter().map(ToString::to_string).collect();
                w.sort();
                h.sort();
                w == h
            }
            (w, h) => w == h,
        },
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_state_orders_one_way() {
        assert!(PkiProvisioningState::Generated > PkiProvisioningState::Unstarted);
        assert!(PkiProvisioningState::Signed > PkiProvisioningState::Exported);
        assert!(PkiProvisioningState::Signed.is_generated());
        assert!(!PkiProvisioningState::Generated.is_signed());
    }

    #[test]
    fn config_equivalence_ignores_array_order_and_extra_observed_fields() {
        let desired = serde_json::json!({
            "issuing_certificates": ["http://a", "http://b"],
        });
        let observed = serde_json::json!({
            "issuing_certificates": ["http://b", "http://a"],
            "crl_distribution_points": [],
        });
        assert!(config_equivalent(
            desired.as_object().unwrap(),
            observed.as_object().unwrap()
        ));
    }

    #[test]
    fn config_equivalence_detects_drift() {
        let desired = serde_json::json!({ "expiry": "72h" });
        let observed = serde_json::json!({ "expiry": "24h" });
        assert!(!config_equivalent(
            desired.as_object().unwrap(),
            observed.as_object().unwrap()
        ));
    }
}
