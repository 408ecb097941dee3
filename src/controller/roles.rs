//! # KubernetesAuthRole Reconciler
//!
//! Reconciles roles under an auth mount through the generic endpoint. The
//! bound namespace set comes from an explicit list or from a label
//! selector resolved against Namespace objects during `prepare`.

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

use crate::crd::KubernetesAuthRole;
use crate::observability::metrics;
use crate::vault::api::{payload_from, Payload};
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::duration::ttl_matches;
use crate::vault::endpoint::{GenericEndpoint, WriteOutcome};
use crate::vault::error::VaultError;

use super::lifecycle::{self, Applied, KubeControlPlane, LifecycleHooks, ObjectState};
use super::reader::KubeCollaboratorReader;
use super::validation::{
    validate_authentication, validate_mount_path, validate_optional_duration,
    validate_target_namespaces,
};
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/kubernetesauthrole-cleanup";
const KIND: &str = "KubernetesAuthRole";

/// Working state for one KubernetesAuthRole reconcile. `namespaces` is the
/// resolved namespace set, sorted for stable payloads.
#[derive(Debug)]
pub struct RoleHooks {
    resource: KubernetesAuthRole,
    namespaces: Vec<String>,
}

impl RoleHooks {
    #[must_use]
    pub fn new(resource: KubernetesAuthRole) -> Self {
        Self {
            resource,
            namespaces: Vec::new(),
        }
    }

    fn role_name(&self) -> String {
        self.resource
            .spec
            .name
            .clone()
            .unwrap_or_else(|| self.resource.name_any())
    }
}

/// Compare a desired string list against an observed JSON array,
/// order-insensitively. A non-array observed value is malformed.
fn list_matches(
    path: &str,
    field: &str,
    desired: &[String],
    observed: Option<&serde_json::Value>,
) -> Result<bool, VaultError> {
    let Some(observed) = observed else {
        return Ok(desired.is_empty());
    };
    let array = observed.as_array().ok_or_else(|| {
        VaultError::malformed(path, format!("field '{field}' is not an array"))
    })?;
    let mut observed: Vec<&str> = array.iter().filter_map(|v| v.as_str()).collect();
    let mut desired: Vec<&str> = desired.iter().map(String::as_str).collect();
    observed.sort_unstable();
    desired.sort_unstable();
    Ok(observed == desired)
}

#[async_trait]
impl VaultResource for RoleHooks {
    fn path(&self) -> String {
        format!(
            "auth/{}/role/{}",
            self.resource.spec.mount.trim_matches('/'),
            self.role_name()
        )
    }

    fn payload(&self) -> Payload {
        let spec = &self.resource.spec;
        let mut payload = payload_from(json!({
            "bound_service_account_names": spec.service_accounts,
            "bound_service_account_namespaces": self.namespaces,
            "token_policies": spec.policies,
        }));
        if let Some(ttl) = &spec.token_ttl {
            payload.insert("token_ttl".to_string(), json!(ttl));
        }
        payload
    }

    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        let path = self.path();
        let spec = &self.resource.spec;

        if !list_matches(
            &path,
            "bound_service_account_names",
            &spec.service_accounts,
            observed.get("bound_service_account_names"),
        )? {
            return Ok(false);
        }
        if !list_matches(
            &path,
            "bound_service_account_namespaces",
            &self.namespaces,
            observed.get("bound_service_account_namespaces"),
        )? {
            return Ok(false);
        }
        if !list_matches(
            &path,
            "token_policies",
            &spec.policies,
            observed.get("token_policies"),
        )? {
            return Ok(false);
        }
        if let Some(desired_ttl) = &spec.token_ttl {
            let Some(observed_ttl) = observed.get("token_ttl") else {
                return Ok(false);
            };
            if !ttl_matches(desired_ttl, observed_ttl)
                .map_err(|e| VaultError::malformed(&path, e.to_string()))?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn is_initialized(&self) -> bool {
        !self.namespaces.is_empty()
    }

    async fn prepare(&mut self, ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        let target = &self.resource.spec.target;
        let mut namespaces = if let Some(list) = &target.target_namespaces {
            list.clone()
        } else if let Some(selector) = &target.namespace_selector {
            let matched = ctx.reader.namespaces_matching(selector).await?;
            if matched.is_empty() {
                return Err(anyhow::anyhow!(
                    "namespaceSelector matched no namespaces; refusing to write a role bound to nothing"
                ));
            }
            matched
        } else {
            // Unreachable past validation; kept as a hard failure.
            return Err(anyhow::anyhow!("no namespace targeting configured"));
        };
        namespaces.sort();
        namespaces.dedup();
        self.namespaces = namespaces;
        Ok(())
    }
}

#[async_trait]
impl LifecycleHooks for RoleHooks {
    fn validate(&self) -> anyhow::Result<()> {
        let spec = &self.resource.spec;
        validate_authentication(&spec.authentication)?;
        validate_mount_path(&spec.mount)?;
        validate_target_namespaces(&spec.target)?;
        validate_optional_duration(spec.token_ttl.as_deref(), "tokenTtl")?;
        if spec.policies.is_empty() {
            return Err(anyhow::anyhow!("policies must not be empty"));
        }
        if spec.service_accounts.is_empty() {
            return Err(anyhow::anyhow!("serviceAccounts must not be empty"));
        }
        Ok(())
    }

    async fn prepare(&mut self, ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        VaultResource::prepare(self, ctx).await
    }

    async fn apply(&mut self, ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError> {
        let endpoint = GenericEndpoint::new(ctx.vault);
        let outcome = endpoint.create_or_update(self).await?;
        if outcome.wrote() {
            metrics::increment_vault_writes(KIND);
        }
        let summary = match outcome {
            WriteOutcome::Created => format!(
                "wrote role {} bound to {} namespace(s)",
                self.role_name(),
                self.namespaces.len()
            ),
            WriteOutcome::Updated => format!("updated role {}", self.role_name()),
            WriteOutcome::Unchanged => format!("role {} is in sync", self.role_name()),
        };
        Ok(Applied {
            requeue_after: None,
            summary,
        })
    }

    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        let endpoint = GenericEndpoint::new(ctx.vault);
        endpoint.delete_if_exists(self).await?;
        Ok(())
    }
}

fn object_state(obj: &KubernetesAuthRole) -> ObjectState {
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
    obj: Arc<KubernetesAuthRole>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let state = object_state(&obj);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, None, Utc::now()) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<KubernetesAuthRole> = Api::namespaced(ctx.client.clone(), &state.namespace);
    let control_plane = KubeControlPlane::new(api, &state.name, state.finalizers.clone());

    let mut hooks = RoleHooks::new((*obj).clone());
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

/// Run the KubernetesAuthRole controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<KubernetesAuthRole> = Api::all(ctx.client.clone());
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
