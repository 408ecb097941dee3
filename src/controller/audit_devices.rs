//! # AuditDevice Reconciler
//!
//! Reconciles AuditDevice resources through the audit endpoint: list-based
//! existence, disable-then-enable on drift.

use std::collections::BTreeMap;
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

use crate::crd::AuditDevice;
use crate::observability::metrics;
use crate::vault::api::{payload_from, Payload};
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::endpoint::{AuditEndpoint, AuditResource, WriteOutcome};
use crate::vault::error::VaultError;

use super::lifecycle::{self, Applied, KubeControlPlane, LifecycleHooks, ObjectState};
use super::reader::KubeCollaboratorReader;
use super::validation::{validate_authentication, validate_mount_path};
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/auditdevice-cleanup";
const KIND: &str = "AuditDevice";

/// Working state for one AuditDevice reconcile.
#[derive(Debug)]
pub struct AuditHooks {
    resource: AuditDevice,
}

impl AuditHooks {
    #[must_use]
    pub fn new(resource: AuditDevice) -> Self {
        Self { resource }
    }

    fn name(&self) -> String {
        self.resource
            .spec
            .path
            .clone()
            .unwrap_or_else(|| self.resource.name_any())
    }
}

impl VaultResource for AuditHooks {
    fn path(&self) -> String {
        format!("sys/audit/{}", self.name())
    }

    fn payload(&self) -> Payload {
        self.enable_payload()
    }

    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        self.is_device_equivalent(observed)
    }
}

impl AuditResource for AuditHooks {
    fn device_name(&self) -> String {
        self.name()
    }

    fn enable_payload(&self) -> Payload {
        let spec = &self.resource.spec;
        let mut payload = payload_from(json!({
            "type": spec.device_type,
            "local": spec.local,
            "options": spec.options,
        }));
        if let Some(description) = &spec.description {
            payload.insert("description".to_string(), json!(description));
        }
        payload
    }

    fn is_device_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        let spec = &self.resource.spec;
        let listing_path = "sys/audit";

        let observed_type = observed
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| VaultError::malformed(listing_path, "audit entry without type"))?;
        if observed_type != spec.device_type {
            return Ok(false);
        }

        // Vault reports an absent description as an empty string.
        let observed_description = observed
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("");
        if spec.description.as_deref().unwrap_or("") != observed_description {
            return Ok(false);
        }

        let observed_local = observed
            .get("local")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if observed_local != spec.local {
            return Ok(false);
        }

        let observed_options: BTreeMap<String, String> = match observed.get("options") {
            None | Some(serde_json::Value::Null) => BTreeMap::new(),
            Some(serde_json::Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = v.as_str().map(ToString::to_string).ok_or_else(|| {
                        VaultError::malformed(
                            listing_path,
                            format!("audit option '{k}' is not a string"),
                        )
                    })?;
                    Ok((k.clone(), value))
                })
                .collect::<Result<_, VaultError>>()?,
            Some(other) => {
                return Err(VaultError::malformed(
                    listing_path,
                    format!("audit options is not an object: {other}"),
                ));
            }
        };

        Ok(observed_options == spec.options)
    }
}

#[async_trait]
impl LifecycleHooks for AuditHooks {
    fn validate(&self) -> anyhow::Result<()> {
        let spec = &self.resource.spec;
        validate_authentication(&spec.authentication)?;
        validate_mount_path(&self.name())?;
        if !["file", "syslog", "socket"].contains(&spec.device_type.as_str()) {
            return Err(anyhow::anyhow!(
                "deviceType '{}' is not one of file, syslog, socket",
                spec.device_type
            ));
        }
        if spec.device_type == "file" && !spec.options.contains_key("file_path") {
            return Err(anyhow::anyhow!(
                "file audit devices require options.file_path"
            ));
        }
        Ok(())
    }

    async fn apply(&mut self, ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError> {
        let endpoint = AuditEndpoint::new(ctx.vault);
        let outcome = endpoint.create_or_update(self).await?;
        if outcome.wrote() {
            metrics::increment_vault_writes(KIND);
        }
        let summary = match outcome {
            WriteOutcome::Created => format!("enabled audit device {}", self.name()),
            WriteOutcome::Updated => {
                format!("re-enabled audit device {} with new options", self.name())
            }
            WriteOutcome::Unchanged => format!("audit device {} is in sync", self.name()),
        };
        Ok(Applied {
            requeue_after: None,
            summary,
        })
    }

    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        let endpoint = AuditEndpoint::new(ctx.vault);
        endpoint.delete_if_exists(self).await?;
        Ok(())
    }
}

fn object_state(obj: &AuditDevice) -> ObjectState {
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
    obj: Arc<AuditDevice>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let state = object_state(&obj);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, None, Utc::now()) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<AuditDevice> = Api::namespaced(ctx.client.clone(), &state.namespace);
    let control_plane = KubeControlPlane::new(api, &state.name, state.finalizers.clone());

    let mut hooks = AuditHooks::new((*obj).clone());
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

/// Run the AuditDevice controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<AuditDevice> = Api::all(ctx.client.clone());
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
