//! # VaultPolicy Reconciler
//!
//! Reconciles ACL policies at `sys/policies/acl/<name>` through the
//! generic endpoint. Accessor placeholders in the policy text are resolved
//! during `prepare` from the referenced SecretsEngine statuses; accessors
//! are only ever round-tripped from the backend, never derived.

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

use crate::crd::VaultPolicy;
use crate::observability::metrics;
use crate::vault::api::{payload_from, Payload};
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::endpoint::{GenericEndpoint, WriteOutcome};
use crate::vault::error::VaultError;

use super::lifecycle::{self, Applied, KubeControlPlane, LifecycleHooks, ObjectState};
use super::reader::KubeCollaboratorReader;
use super::validation::validate_authentication;
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/vaultpolicy-cleanup";
const KIND: &str = "VaultPolicy";

/// Working state for one VaultPolicy reconcile. `rendered` holds the
/// policy text after accessor substitution.
#[derive(Debug)]
pub struct PolicyHooks {
    resource: VaultPolicy,
    namespace: String,
    rendered: Option<String>,
}

impl PolicyHooks {
    #[must_use]
    pub fn new(resource: VaultPolicy) -> Self {
        let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
        Self {
            resource,
            namespace,
            rendered: None,
        }
    }

    fn policy_name(&self) -> String {
        self.resource
            .spec
            .name
            .clone()
            .unwrap_or_else(|| self.resource.name_any())
    }

    fn rendered_policy(&self) -> &str {
        self.rendered
            .as_deref()
            .unwrap_or(self.resource.spec.policy.as_str())
    }
}

#[async_trait]
impl VaultResource for PolicyHooks {
    fn path(&self) -> String {
        format!("sys/policies/acl/{}", self.policy_name())
    }

    fn payload(&self) -> Payload {
        payload_from(json!({ "policy": self.rendered_policy() }))
    }

    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        let observed_policy = observed
            .get("policy")
            .and_then(|p| p.as_str())
            .ok_or_else(|| {
                VaultError::malformed(&self.path(), "policy document without policy text")
            })?;
        Ok(observed_policy.trim() == self.rendered_policy().trim())
    }

    async fn prepare(&mut self, ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        let mut rendered = self.resource.spec.policy.clone();
        for reference in &self.resource.spec.accessor_references {
            let namespace = reference.namespace.as_deref().unwrap_or(&self.namespace);
            let accessor = ctx
                .reader
                .engine_accessor(namespace, &reference.name)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "accessor for SecretsEngine {namespace}/{} is not yet available",
                        reference.name
                    )
                })?;
            rendered = rendered.replace(&format!("{{{{accessor:{}}}}}", reference.name), &accessor);
        }
        if rendered.contains("{{accessor:") {
            return Err(anyhow::anyhow!(
                "policy text contains accessor placeholders with no matching accessorReferences entry"
            ));
        }
        self.rendered = Some(rendered);
        Ok(())
    }
}

#[async_trait]
impl LifecycleHooks for PolicyHooks {
    fn validate(&self) -> anyhow::Result<()> {
        validate_authentication(&self.resource.spec.authentication)?;
        if self.resource.spec.policy.trim().is_empty() {
            return Err(anyhow::anyhow!("policy must not be empty"));
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
            WriteOutcome::Created => format!("wrote policy {}", self.policy_name()),
            WriteOutcome::Updated => format!("updated policy {}", self.policy_name()),
            WriteOutcome::Unchanged => format!("policy {} is in sync", self.policy_name()),
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

fn object_state(obj: &VaultPolicy) -> ObjectState {
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
    obj: Arc<VaultPolicy>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let state = object_state(&obj);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, None, Utc::now()) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<VaultPolicy> = Api::namespaced(ctx.client.clone(), &state.namespace);
    let control_plane = KubeControlPlane::new(api, &state.name, state.finalizers.clone());

    let mut hooks = PolicyHooks::new((*obj).clone());
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

/// Run the VaultPolicy controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<VaultPolicy> = Api::all(ctx.client.clone());
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
