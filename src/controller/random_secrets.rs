//! # RandomSecret Reconciler
//!
//! Generates secrets from a Vault password policy and writes them under a
//! KV mount on the refresh clock.
//!
//! The one-off policy is deliberate: whether the secret is (re)written is
//! keyed off `status.lastUpdated`, never off backend existence. A secret
//! deleted out-of-band is not regenerated: consumers captured the
//! original value, and silently minting a new one would diverge from it.

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

use crate::crd::RandomSecret;
use crate::observability::metrics;
use crate::vault::api::Payload;
use crate::vault::contract::{ReconcileContext, VaultResource};
use crate::vault::duration::parse_vault_duration;
use crate::vault::endpoint::GenericEndpoint;
use crate::vault::error::VaultError;

use super::clock::{ClockDecision, RotationClock};
use super::lifecycle::{self, Applied, KubeControlPlane, LifecycleHooks, ObjectState};
use super::reader::KubeCollaboratorReader;
use super::validation::{
    validate_authentication, validate_mount_path, validate_optional_duration,
};
use super::{error_policy, resource_key, ControllerContext, ReconcileError};

use async_trait::async_trait;

pub const FINALIZER: &str = "vault.microscaler.io/randomsecret-cleanup";
const KIND: &str = "RandomSecret";

/// Working state for one RandomSecret reconcile.
#[derive(Debug)]
pub struct RandomSecretHooks {
    resource: RandomSecret,
    decision: ClockDecision,
    clock: RotationClock,
    generated: Option<Zeroizing<String>>,
    last_updated: Option<DateTime<Utc>>,
}

impl RandomSecretHooks {
    /// Build hooks for this reconcile, fixing the clock decision at `now`.
    #[must_use]
    pub fn new(resource: RandomSecret, now: DateTime<Utc>) -> Self {
        let last_updated = last_updated(&resource);
        let clock = RotationClock::new(
            resource
                .spec
                .refresh_period
                .as_deref()
                .and_then(|p| parse_vault_duration(p).ok()),
        );
        let decision = clock.refresh_due(last_updated, now);
        Self {
            resource,
            decision,
            clock,
            generated: None,
            last_updated,
        }
    }

    #[must_use]
    pub fn decision(&self) -> ClockDecision {
        self.decision
    }

    fn secret_name(&self) -> String {
        self.resource
            .spec
            .name
            .clone()
            .unwrap_or_else(|| self.resource.name_any())
    }
}

/// Parse `status.lastUpdated`, the local source of truth for the one-off
/// and refresh decisions.
fn last_updated(resource: &RandomSecret) -> Option<DateTime<Utc>> {
    resource
        .status
        .as_ref()
        .and_then(|s| s.last_updated.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl VaultResource for RandomSecretHooks {
    fn path(&self) -> String {
        format!(
            "{}/{}",
            self.resource.spec.mount.trim_matches('/'),
            self.secret_name()
        )
    }

    fn payload(&self) -> Payload {
        let value = self
            .generated
            .as_ref()
            .map(|v| v.as_str())
            .unwrap_or_default();
        let mut payload = Payload::new();
        payload.insert(self.resource.spec.key.clone(), json!(value));
        payload
    }

    fn is_equivalent(&self, _observed: &Payload) -> Result<bool, VaultError> {
        // Generated secrets are never converged against the backend; the
        // refresh clock alone decides whether a write happens.
        Ok(true)
    }

    fn is_initialized(&self) -> bool {
        self.generated.is_some()
    }

    async fn prepare(&mut self, ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        if self.decision != ClockDecision::RunNow {
            return Ok(());
        }
        let generate_path = format!(
            "sys/policies/password/{}/generate",
            self.resource.spec.password_policy
        );
        let response = ctx.vault.read(&generate_path).await?.ok_or_else(|| {
            anyhow::anyhow!(
                "password policy '{}' does not exist",
                self.resource.spec.password_policy
            )
        })?;
        let password = response
            .get("password")
            .and_then(|p| p.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("password policy generate response carries no password")
            })?;
        self.generated = Some(Zeroizing::new(password.to_string()));
        Ok(())
    }
}

#[async_trait]
impl LifecycleHooks for RandomSecretHooks {
    fn validate(&self) -> anyhow::Result<()> {
        let spec = &self.resource.spec;
        validate_authentication(&spec.authentication)?;
        validate_mount_path(&spec.mount)?;
        validate_optional_duration(spec.refresh_period.as_deref(), "refreshPeriod")?;
        if spec.password_policy.trim().is_empty() {
            return Err(anyhow::anyhow!("passwordPolicy must not be empty"));
        }
        if spec.key.trim().is_empty() {
            return Err(anyhow::anyhow!("key must not be empty"));
        }
        Ok(())
    }

    async fn prepare(&mut self, ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        VaultResource::prepare(self, ctx).await
    }

    async fn apply(&mut self, ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError> {
        match self.decision {
            ClockDecision::RunNow => {
                let endpoint = GenericEndpoint::new(ctx.vault);
                endpoint.create(self).await?;
                metrics::increment_vault_writes(KIND);
                self.last_updated = Some(Utc::now());
                Ok(Applied {
                    requeue_after: self.clock.next_after_run(),
                    summary: format!("generated secret at {}", self.path()),
                })
            }
            ClockDecision::Wait(remaining) => Ok(Applied {
                requeue_after: Some(remaining),
                summary: format!("secret at {} refreshes later", self.path()),
            }),
            ClockDecision::Never => Ok(Applied {
                requeue_after: None,
                summary: format!("one-off secret at {} already generated", self.path()),
            }),
        }
    }

    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        let endpoint = GenericEndpoint::new(ctx.vault);
        endpoint.delete_if_exists(self).await?;
        Ok(())
    }

    fn status_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::new();
        fields.insert(
            "lastUpdated".to_string(),
            json!(self.last_updated.map(|t| t.to_rfc3339())),
        );
        fields
    }
}

fn object_state(obj: &RandomSecret) -> ObjectState {
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
    obj: Arc<RandomSecret>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let now = Utc::now();
    let state = object_state(&obj);
    let mut hooks = RandomSecretHooks::new((*obj).clone(), now);

    if let Some(action) = lifecycle::gate(&state, &ctx.sync_policy, Some(hooks.decision()), now) {
        return Ok(action);
    }
    metrics::increment_reconciliations(KIND);

    let api: Api<RandomSecret> = Api::namespaced(ctx.client.clone(), &state.namespace);
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

/// Run the RandomSecret controller until shutdown.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api: Api<RandomSecret> = Api::all(ctx.client.clone());
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
