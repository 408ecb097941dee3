//! # DatabaseConnection Reconciler
//!
//! Reconciles database engine connection configurations through the
//! generic endpoint and rotates the root credential on the rotation clock
//! (`<mount>/rotate-root/<name>`). The initial password is resolved from a
//! Kubernetes Secret during `prepare`; Vault never echoes it back, so it
//! is excluded from equivalence.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use serde_json::json;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crd::DatabaseConnection;
use crate::observability::metrics;
use crate::vault::api::{payload_from, Payload};
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::duration::parse_vault_duration;
use crate::vault::endpoint::{GenericEndpoint, WriteOutcome};
use crate::vault::error::VaultError;

use super::clock::{ClockDecision, RotationClock};
use super::lifecycle::{self, Applied, KubeControlPlane, LifecycleHooks, ObjectState};
use super::reader::KubeCollaboratorReader;
use super::validation::{
    validate_authentication, validate_mount_path, validate_optional_duration,
};
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/databaseconnection-cleanup";
const KIND: &str = "DatabaseConnection";

/// Working state for one DatabaseConnection reconcile.
#[derive(Debug)]
pub struct DatabaseConnectionHooks {
    resource: DatabaseConnection,
    namespace: String,
    decision: ClockDecision,
    clock: RotationClock,
    password: Option<Zeroizing<String>>,
    last_rotation: Option<DateTime<Utc>>,
}

impl DatabaseConnectionHooks {
    /// Build hooks for this reconcile, fixing the clock decision at `now`.
    #[must_use]
    pub fn new(resource: DatabaseConnection, now: DateTime<Utc>) -> Self {
        let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
        let last_rotation = last_rotation(&resource);
        let clock = RotationClock::new(
            resource
                .spec
                .rotation_period
                .as_deref()
                .and_then(|p| parse_vault_duration(p).ok()),
        );
        let decision = clock.rotation_due(last_rotation, now);
        Self {
            resource,
            namespace,
            decision,
            clock,
            password: None,
            last_rotation,
        }
    }

    #[must_use]
    pub fn decision(&self) -> ClockDecision {
        self.decision
    }

    fn connection_name(&self) -> String {
        self.resource
            .spec
            .name
            .clone()
            .unwrap_or_else(|| self.resource.name_any())
    }

    fn mount(&self) -> String {
        self.resource.spec.mount.trim_matches('/').to_string()
    }

    fn rotate_root_path(&self) -> String {
        format!("{}/rotate-root/{}", self.mount(), self.connection_name())
    }
}

fn last_rotation(resource: &DatabaseConnection) -> Option<DateTime<Utc>> {
    resource
        .status
        .as_ref()
        .and_then(|s| s.last_root_rotation.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl VaultResource for DatabaseConnectionHooks {
    fn path(&self) -> String {
        format!("{}/config/{}", self.mount(), self.connection_name())
    }

    fn payload(&self) -> Payload {
        let spec = &self.resource.spec;
        let password = self
            .password
            .as_ref()
            .map(|p| p.as_str())
            .unwrap_or_default();
        payload_from(json!({
            "plugin_name": spec.plugin_name,
            "connection_url": spec.connection_url,
            "username": spec.username,
            "password": password,
            "allowed_roles": spec.allowed_roles,
            "verify_connection": spec.verify_connection,
        }))
    }

    fn is_equivalent(&self, observed: &Payload) -> Result<bool, VaultError> {
        let path = self.path();
        let spec = &self.resource.spec;

        if observed.get("plugin_name").and_then(|v| v.as_str()) != Some(spec.plugin_name.as_str()) {
            return Ok(false);
        }

        // Vault nests URL and username under connection_details; the
        // password is write-only and never participates.
        let details = match observed.get("connection_details") {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                return Err(VaultError::malformed(
                    &path,
                    format!("connection_details is not an object: {other}"),
                ));
            }
            None => return Ok(false),
        };
        if details.get("connection_url").and_then(|v| v.as_str())
            != Some(spec.connection_url.as_str())
        {
            return Ok(false);
        }
        if details.get("username").and_then(|v| v.as_str()) != Some(spec.username.as_str()) {
            return Ok(false);
        }

        let mut observed_roles: Vec<&str> = match observed.get("allowed_roles") {
            Some(serde_json::Value::Array(roles)) => {
                roles.iter().filter_map(|v| v.as_str()).collect()
            }
            Some(other) => {
                return Err(VaultError::malformed(
                    &path,
                    format!("allowed_roles is not an array: {other}"),
                ));
            }
            None => Vec::new(),
        };
        let mut desired_roles: Vec<&str> =
            spec.allowed_roles.iter().map(String::as_str).collect();
        observed_roles.sort_unstable();
        desired_roles.sort_unstable();
        Ok(observed_roles == desired_roles)
    }

    fn is_initialized(&self) -> bool {
        self.password.is_some()
    }

    async fn prepare(&mut self, ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        let secret_ref = &self.resource.spec.password_secret;
        let namespace = secret_ref.namespace.as_deref().unwrap_or(&self.namespace);
        let password = ctx
            .reader
            .secret_value(namespace, &secret_ref.name, &secret_ref.key)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "secret {namespace}/{} has no key '{}'",
                    secret_ref.name,
                    secret_ref.key
                )
            })?;
        self.password = Some(Zeroizing::new(password));
        Ok(())
    }
}

#[async_trait]
impl LifecycleHooks for DatabaseConnectionHooks {
    fn validate(&self) -> anyhow::Result<()> {
        let spec = &self.resource.spec;
        validate_authentication(&spec.authentication)?;
        validate_mount_path(&spec.mount)?;
        validate_optional_duration(spec.rotation_period.as_deref(), "rotationPeriod")?;
        if spec.plugin_name.trim().is_empty() {
            return Err(anyhow::anyhow!("pluginName must not be empty"));
        }
        if spec.connection_url.trim().is_empty() {
            return Err(anyhow::anyhow!("connectionUrl must not be empty"));
        }
        if spec.username.trim().is_empty() {
            return Err(anyhow::anyhow!("username must not be empty"));
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

        let (requeue_after, rotated) = match self.decision {
            ClockDecision::RunNow => {
                ctx.vault
                    .write(&self.rotate_root_path(), &Payload::new())
                    .await?;
                metrics::increment_vault_writes(KIND);
                self.last_rotation = Some(Utc::now());
                (self.clock.next_after_run(), true)
            }
            ClockDecision::Wait(remaining) => (Some(remaining), false),
            ClockDecision::Never => (None, false),
        };

        let summary = match (outcome, rotated) {
            (WriteOutcome::Created, _) => {
                format!("configured database connection {}", self.connection_name())
            }
            (_, true) => format!("rotated root credential for {}", self.connection_name()),
            (WriteOutcome::Updated, false) => {
                format!("updated database connection {}", self.connection_name())
            }
            (WriteOutcome::Unchanged, false) => {
                format!("database connection {} is in sync", self.connection_name())
            }
        };
        Ok(Applied {
            requeue_after,
            summary,
        })
    }

    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        let endpoint = GenericEndpoint::new(ctx.vault);
        endpoint.delete_if_exists(self).await?;
        Ok(())
    }

    fn status_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        fields.insert(
            "lastRootRotation".to_string(),
            json!(self.last_rotation.map(|t| t.to_rfc3339())),
        );
        fields
    }
}

fn object_state(obj: &DatabaseConnection) -> ObjectState {
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
    obj: Arc<DatabaseConnection>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let now = Utc::now();
    let state = object_state(&obj);
    let mut hooks = DatabaseConnectionHooks::new((*obj).clone(), now);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, Some(hooks.decision()), now) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<DatabaseConnection> = Api::namespaced(ctx.client.clone(), &state.namespace);
    let control_plane = KubeControlPlane::new(api, &state.name, state.finalizers.clone());

    // Reject invalid specs before any backend call, the login included.
    if let Some(action) = lifecycle::reject_invalid(&state, &hooks, &control_plane, now).await? {
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
        now,
    )
    .await?;

    ctx.reset_backoff(&resource_key(obj.as_ref()));
    metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    Ok(action)
}

/// Run the DatabaseConnection controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<DatabaseConnection> = Api::all(ctx.client.clone());
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
