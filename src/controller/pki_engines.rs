//! # PKIEngine Reconciler
//!
//! Drives the PKI endpoint's provisioning state machine and persists its
//! one-way progress (state, certificate, CSR, exported key) on status.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use serde_json::json;
use tracing::{debug, info};

use crate::crd::{PKIEngine, PKIEngineSpec, PkiVariant};
use crate::observability::metrics;
use crate::vault::api::{payload_from, Payload};
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::endpoint::{
    EngineResource, PkiEndpoint, PkiProvisioningState, PkiResource, WriteOutcome,
};
use crate::vault::error::VaultError;

use super::lifecycle::{self, Applied, KubeControlPlane, LifecycleHooks, ObjectState};
use super::reader::KubeCollaboratorReader;
use super::validation::{
    validate_authentication, validate_mount_path, validate_optional_duration,
};
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/pkiengine-cleanup";
const KIND: &str = "PKIEngine";

/// Working state for one PKIEngine reconcile. Provisioning fields start
/// from status and only ever move forward.
#[derive(Debug)]
pub struct PkiHooks {
    resource: PKIEngine,
    accessor: Option<String>,
    state: PkiProvisioningState,
    certificate: Option<String>,
    csr: Option<String>,
    exported_private_key: Option<String>,
}

impl PkiHooks {
    #[must_use]
    pub fn new(resource: PKIEngine) -> Self {
        let status = resource.status.clone().unwrap_or_default();
        Self {
            resource,
            accessor: status.accessor,
            state: status.provisioning_state,
            certificate: status.certificate,
            csr: status.csr,
            exported_private_key: status.exported_private_key,
        }
    }

    fn spec(&self) -> &PKIEngineSpec {
        &self.resource.spec
    }

    fn mount(&self) -> String {
        self.spec().path.trim_matches('/').to_string()
    }
}

impl VaultResource for PkiHooks {
    fn path(&self) -> String {
        format!("sys/mounts/{}", self.mount())
    }

    fn payload(&self) -> Payload {
        let spec = self.spec();
        let mut payload = payload_from(json!({ "type": "pki" }));
        payload.insert(
            "description".to_string(),
            json!(format!("PKI engine for {}", spec.common_name)),
        );
        if let Some(tune) = &spec.tune {
            let mut config = serde_json::Map::new();
            if let Some(ttl) = &tune.default_lease_ttl {
                config.insert("default_lease_ttl".to_string(), json!(ttl));
            }
            if let Some(ttl) = &tune.max_lease_ttl {
                config.insert("max_lease_ttl".to_string(), json!(ttl));
            }
            if !config.is_empty() {
                payload.insert("config".to_string(), serde_json::Value::Object(config));
            }
        }
        payload
    }

    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        Ok(observed.get("type").and_then(|t| t.as_str()) == Some("pki"))
    }
}

impl EngineResource for PkiHooks {
    fn mount_parent(&self) -> String {
        "sys/mounts".to_string()
    }

    fn tune_payload(&self) -> Payload {
        let mut payload = serde_json::Map::new();
        if let Some(tune) = &self.spec().tune {
            if let Some(ttl) = &tune.default_lease_ttl {
                payload.insert("default_lease_ttl".to_string(), json!(ttl));
            }
            if let Some(ttl) = &tune.max_lease_ttl {
                payload.insert("max_lease_ttl".to_string(), json!(ttl));
            }
        }
        payload
    }

    fn is_tune_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        use crate::vault::duration::ttl_matches;
        let Some(tune) = &self.spec().tune else {
            return Ok(true);
        };
        let tune_path = format!("{}/tune", self.path());
        for (field, desired) in [
            ("default_lease_ttl", &tune.default_lease_ttl),
            ("max_lease_ttl", &tune.max_lease_ttl),
        ] {
            if let Some(desired) = desired {
                let observed_ttl = observed.get(field).ok_or_else(|| {
                    VaultError::malformed(&tune_path, format!("tune document without {field}"))
                })?;
                if !ttl_matches(desired, observed_ttl)
                    .map_err(|e| VaultError::malformed(&tune_path, e.to_string()))?
                {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn accessor(&self) -> Option<String> {
        self.accessor.clone()
    }

    fn set_accessor(&mut self, accessor: String) {
        self.accessor = Some(accessor);
    }
}

impl PkiResource for PkiHooks {
    fn provisioning_state(&self) -> PkiProvisioningState {
        self.state
    }

    fn advance_state(&mut self, next: PkiProvisioningState) {
        // One-way: a later stage never falls back.
        if next > self.state {
            self.state = next;
        }
    }

    fn is_intermediate(&self) -> bool {
        matches!(self.spec().variant, PkiVariant::Intermediate { .. })
    }

    fn wants_export(&self) -> bool {
        self.spec().export_private_key
    }

    fn generate_path(&self) -> String {
        let family = if self.is_intermediate() {
            "intermediate"
        } else {
            "root"
        };
        let mode = if self.wants_export() {
            "exported"
        } else {
            "internal"
        };
        format!("{}/{family}/generate/{mode}", self.mount())
    }

    fn generate_payload(&self) -> Payload {
        let spec = self.spec();
        let mut payload = payload_from(json!({
            "common_name": spec.common_name,
            "key_type": spec.key_type,
            "key_bits": spec.key_bits,
        }));
        if let Some(ttl) = &spec.ttl {
            payload.insert("ttl".to_string(), json!(ttl));
        }
        payload
    }

    fn record_generated(&mut self, response: &Payload) {
        if let Some(certificate) = response.get("certificate").and_then(|v| v.as_str()) {
            self.certificate = Some(certificate.to_string());
        }
        if let Some(csr) = response.get("csr").and_then(|v| v.as_str()) {
            self.csr = Some(csr.to_string());
        }
        if let Some(key) = response.get("private_key").and_then(|v| v.as_str()) {
            self.exported_private_key = Some(key.to_string());
        }
    }

    fn sign_request_path(&self) -> Option<String> {
        match &self.spec().variant {
            PkiVariant::Intermediate { parent_mount } => Some(format!(
                "{}/root/sign-intermediate",
                parent_mount.trim_matches('/')
            )),
            PkiVariant::Root => None,
        }
    }

    fn sign_request_payload(&self) -> Result<Payload, VaultError> {
        let csr = self.csr.as_deref().ok_or_else(|| {
            VaultError::malformed(&self.path(), "no CSR recorded before signing")
        })?;
        let spec = self.spec();
        let mut payload = payload_from(json!({
            "csr": csr,
            "common_name": spec.common_name,
            "format": "pem_bundle",
        }));
        if let Some(ttl) = &spec.ttl {
            payload.insert("ttl".to_string(), json!(ttl));
        }
        Ok(payload)
    }

    fn record_signed(&mut self, response: &Payload) {
        if let Some(certificate) = response.get("certificate").and_then(|v| v.as_str()) {
            self.certificate = Some(certificate.to_string());
        }
    }

    fn set_signed_path(&self) -> String {
        format!("{}/intermediate/set-signed", self.mount())
    }

    fn set_signed_payload(&self) -> Result<Payload, VaultError> {
        let certificate = self.certificate.as_deref().ok_or_else(|| {
            VaultError::malformed(&self.path(), "no signed certificate recorded")
        })?;
        Ok(payload_from(json!({ "certificate": certificate })))
    }

    fn urls_payload(&self) -> Option<Payload> {
        self.spec().urls.as_ref().map(|urls| {
            payload_from(json!({
                "issuing_certificates": urls.issuing_certificates,
                "crl_distribution_points": urls.crl_distribution_points,
                "ocsp_servers": urls.ocsp_servers,
            }))
        })
    }

    fn crl_payload(&self) -> Option<Payload> {
        self.spec().crl.as_ref().map(|crl| {
            let mut payload = payload_from(json!({ "disable": crl.disable }));
            if let Some(expiry) = &crl.expiry {
                payload.insert("expiry".to_string(), json!(expiry));
            }
            payload
        })
    }

    fn engine_mount(&self) -> String {
        self.mount()
    }
}

#[async_trait]
impl LifecycleHooks for PkiHooks {
    fn validate(&self) -> anyhow::Result<()> {
        let spec = self.spec();
        validate_mount_path(&spec.path)?;
        validate_authentication(&spec.authentication)?;
        validate_optional_duration(spec.ttl.as_deref(), "ttl")?;
        if spec.common_name.trim().is_empty() {
            return Err(anyhow::anyhow!("commonName must not be empty"));
        }
        if !["rsa", "ec", "ed25519"].contains(&spec.key_type.as_str()) {
            return Err(anyhow::anyhow!(
                "keyType '{}' is not one of rsa, ec, ed25519",
                spec.key_type
            ));
        }
        if let PkiVariant::Intermediate { parent_mount } = &spec.variant {
            validate_mount_path(parent_mount)?;
        }
        if let Some(crl) = &spec.crl {
            validate_optional_duration(crl.expiry.as_deref(), "crl.expiry")?;
        }
        Ok(())
    }

    async fn apply(&mut self, ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError> {
        let endpoint = PkiEndpoint::new(ctx.vault);
        let outcome = endpoint.reconcile(self).await?;
        if outcome.wrote() {
            metrics::increment_vault_writes(KIND);
        }
        let summary = match outcome {
            WriteOutcome::Created => {
                format!("provisioned PKI engine at {} ({:?})", self.mount(), self.state)
            }
            WriteOutcome::Updated => format!("converged PKI configuration at {}", self.mount()),
            WriteOutcome::Unchanged => format!("PKI engine at {} is in sync", self.mount()),
        };
        Ok(Applied {
            requeue_after: None,
            summary,
        })
    }

    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        let endpoint = PkiEndpoint::new(ctx.vault);
        endpoint.delete_if_exists(self).await?;
        Ok(())
    }

    fn status_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        fields.insert("accessor".to_string(), json!(self.accessor));
        fields.insert("provisioningState".to_string(), json!(self.state));
        fields.insert("certificate".to_string(), json!(self.certificate));
        fields.insert("csr".to_string(), json!(self.csr));
        fields.insert(
            "exportedPrivateKey".to_string(),
            json!(self.exported_private_key),
        );
        fields
    }
}

fn object_state(obj: &PKIEngine) -> ObjectState {
    ObjectState {
        name: obj.name_any(),
        namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
        generation: obj.metadata.generation,
        observed_generation: obj.status.as_ref().and_then(|s| s.observed_generation),
        deleting: obj.metadata.deletion_timestamp.is_some(),
        finalizers: obj.metadata.finalizers.clone().unwrap_or_default(),
        conditions: obj
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default(),
    }
}

pub async fn reconcile(
    obj: Arc<PKIEngine>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let state = object_state(&obj);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, None, Utc::now()) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<PKIEngine> = Api::namespaced(ctx.client.clone(), &state.namespace);
    let control_plane = KubeControlPlane::new(api, &state.name, state.finalizers.clone());

    let mut hooks = PkiHooks::new((*obj).clone());
    // Reject invalid specs before any backend call, the login included.
    if let Some(action) =
        lifecycle::reject_invalid(&state, &hooks, &control_plane, Utc::now()).await?
    {
        return Ok(action);
    }

    let vault = ctx.vault_session(&obj.spec.authentication).await?;
    let reader = KubeCollaboratorReader::new(ctx.client.clone());
    let rctx = ReconcileContext {
        vault: &vault,
        reader: &reader,
        vault_namespace: obj.spec.authentication.namespace.as_deref(),
    };
    let action = lifecycle::run_lifecycle(
        &state,
        FINALIZER,
        &mut hooks,
        &control_plane,
        &rctx,
        &ctx.sync_policy,
        Utc::now(),
    )
    .await?;

    ctx.reset_backoff(&resource_key(obj.as_ref()));
    metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    Ok(action)
}

/// Run the PKIEngine controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<PKIEngine> = Api::all(ctx.client.clone());
    info!("Starting {KIND} controller");

    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(
            reconcile,
            |obj, error, ctx| error_policy(obj, error, ctx, KIND),
            ctx,
        )
        .for_each(|result| async move {
            if let Ok((obj, _action)) = result {
                debug!("Reconciled {KIND} {}", obj.name);
            }
        })
        .await;

    Ok(())
}
