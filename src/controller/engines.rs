//! # SecretsEngine Reconciler
//!
//! Reconciles SecretsEngine resources through the engine endpoint:
//! existence via the mount listing, mount on absence, tune convergence on
//! drift, and accessor propagation back onto status.

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

use crate::crd::{SecretsEngine, SecretsEngineSpec};
use crate::observability::metrics;
use crate::vault::api::{payload_from, Payload};
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::duration::ttl_matches;
use crate::vault::endpoint::{EngineEndpoint, EngineResource, WriteOutcome};
use crate::vault::error::VaultError;

use super::lifecycle::{
    self, Applied, KubeControlPlane, LifecycleHooks, ObjectState,
};
use super::reader::KubeCollaboratorReader;
use super::validation::{
    validate_authentication, validate_mount_path, validate_optional_duration,
};
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/secretsengine-cleanup";
const KIND: &str = "SecretsEngine";

/// Working state for one SecretsEngine reconcile.
#[derive(Debug)]
pub struct EngineHooks {
    resource: SecretsEngine,
    accessor: Option<String>,
}

impl EngineHooks {
    #[must_use]
    pub fn new(resource: SecretsEngine) -> Self {
        let accessor = resource.status.as_ref().and_then(|s| s.accessor.clone());
        Self { resource, accessor }
    }

    fn spec(&self) -> &SecretsEngineSpec {
        &self.resource.spec
    }
}

impl VaultResource for EngineHooks {
    fn path(&self) -> String {
        self.spec().mount_path()
    }

    fn payload(&self) -> Payload {
        let spec = self.spec();
        let mut config = serde_json::Map::new();
        if let Some(tune) = &spec.config {
            if let Some(ttl) = &tune.default_lease_ttl {
                config.insert("default_lease_ttl".to_string(), json!(ttl));
            }
            if let Some(ttl) = &tune.max_lease_ttl {
                config.insert("max_lease_ttl".to_string(), json!(ttl));
            }
            if let Some(visibility) = &tune.listing_visibility {
                config.insert("listing_visibility".to_string(), json!(visibility));
            }
        }

        let mut payload = payload_from(json!({ "type": spec.engine_type }));
        if let Some(description) = &spec.description {
            payload.insert("description".to_string(), json!(description));
        }
        if !config.is_empty() {
            payload.insert("config".to_string(), serde_json::Value::Object(config));
        }
        if let Some(options) = &spec.options {
            payload.insert("options".to_string(), json!(options));
        }
        payload
    }

    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        // Mounts are never compared through a direct read (they have no
        // readable self document); type equality is the only meaningful
        // check should one ever surface here.
        Ok(observed.get("type").and_then(|t| t.as_str()) == Some(self.spec().engine_type.as_str()))
    }
}

impl EngineResource for EngineHooks {
    fn mount_parent(&self) -> String {
        self.spec().category.parent().to_string()
    }

    fn tune_payload(&self) -> Payload {
        let mut payload = serde_json::Map::new();
        if let Some(tune) = &self.spec().config {
            if let Some(ttl) = &tune.default_lease_ttl {
                payload.insert("default_lease_ttl".to_string(), json!(ttl));
            }
            if let Some(ttl) = &tune.max_lease_ttl {
                payload.insert("max_lease_ttl".to_string(), json!(ttl));
            }
            if let Some(visibility) = &tune.listing_visibility {
                payload.insert("listing_visibility".to_string(), json!(visibility));
            }
        }
        payload
    }

    fn is_tune_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        let Some(tune) = &self.spec().config else {
            return Ok(true);
        };
        let tune_path = format!("{}/tune", self.path());

        if let Some(desired) = &tune.default_lease_ttl {
            let observed_ttl = observed.get("default_lease_ttl").ok_or_else(|| {
                VaultError::malformed(&tune_path, "tune document without default_lease_ttl")
            })?;
            if !ttl_matches(desired, observed_ttl)
                .map_err(|e| VaultError::malformed(&tune_path, e.to_string()))?
            {
                return Ok(false);
            }
        }
        if let Some(desired) = &tune.max_lease_ttl {
            let observed_ttl = observed.get("max_lease_ttl").ok_or_else(|| {
                VaultError::malformed(&tune_path, "tune document without max_lease_ttl")
            })?;
            if !ttl_matches(desired, observed_ttl)
                .map_err(|e| VaultError::malformed(&tune_path, e.to_string()))?
            {
                return Ok(false);
            }
        }
        if let Some(desired) = &tune.listing_visibility {
            // Vault reports an unset visibility as an empty string.
            let observed_visibility = observed
                .get("listing_visibility")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if desired != observed_visibility {
                return Ok(false);
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

#[async_trait]
impl LifecycleHooks for EngineHooks {
    fn validate(&self) -> anyhow::Result<()> {
        let spec = self.spec();
        validate_mount_path(&spec.path)?;
        validate_authentication(&spec.authentication)?;
        if let Some(tune) = &spec.config {
            validate_optional_duration(tune.default_lease_ttl.as_deref(), "config.defaultLeaseTtl")?;
            validate_optional_duration(tune.max_lease_ttl.as_deref(), "config.maxLeaseTtl")?;
        }
        if spec.engine_type.trim().is_empty() {
            return Err(anyhow::anyhow!("engineType must not be empty"));
        }
        Ok(())
    }

    async fn apply(&mut self, ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError> {
        let endpoint = EngineEndpoint::new(ctx.vault);
        let outcome = endpoint.reconcile(self).await?;
        if outcome.wrote() {
            metrics::increment_vault_writes(KIND);
        }
        let summary = match outcome {
            WriteOutcome::Created => format!(
                "mounted {} engine at {}",
                self.spec().engine_type,
                self.spec().path
            ),
            WriteOutcome::Updated => format!("tuned engine at {}", self.spec().path),
            WriteOutcome::Unchanged => format!("engine at {} is in sync", self.spec().path),
        };
        Ok(Applied {
            requeue_after: None,
            summary,
        })
    }

    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        let endpoint = EngineEndpoint::new(ctx.vault);
        endpoint.delete_if_exists(self).await?;
        Ok(())
    }

    fn status_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        fields.insert("accessor".to_string(), json!(self.accessor));
        fields
    }
}

fn object_state(obj: &SecretsEngine) -> ObjectState {
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
    obj: Arc<SecretsEngine>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let state = object_state(&obj);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, None, Utc::now()) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<SecretsEngine> = Api::namespaced(ctx.client.clone(), &state.namespace);
    let control_plane = KubeControlPlane::new(api, &state.name, state.finalizers.clone());

    let mut hooks = EngineHooks::new((*obj).clone());
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

/// Run the SecretsEngine controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<SecretsEngine> = Api::all(ctx.client.clone());
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
