//! # Reconciliation State Machine
//!
//! Orchestrates the lifecycle of any Vault resource kind around its
//! endpoint: deletion (backend cleanup, then finalizer removal), creation
//! and drift-aware update, condition bookkeeping, and the requeue deadline
//! handed back to the scheduler.
//!
//! Every transition is terminal per invocation. There is no retry loop in
//! here: a failure aborts the rest of the reconcile and the caller's
//! requeue/backoff policy decides when to try again, which is safe because
//! every write path is idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube_runtime::controller::Action;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{info, warn};

use crate::crd::Condition;
use crate::vault::contract::ReconcileContext;

use super::conditions::{
    failed, has_failed_condition, last_successful_time, record_failure, record_success, successful,
    was_created,
};
use super::predicates::{Decision, SyncPolicy};
use super::ReconcileError;

/// Control-plane write seam: finalizers and status, nothing else.
///
/// The Kubernetes-backed implementation patches through the API server;
/// tests substitute an in-memory one to assert ordering invariants.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn ensure_finalizer(&self, finalizer: &str) -> anyhow::Result<()>;
    async fn remove_finalizer(&self, finalizer: &str) -> anyhow::Result<()>;
    async fn patch_status(&self, status: Value) -> anyhow::Result<()>;
}

/// Per-kind glue between the state machine and a backend endpoint.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Reject invalid specs before any backend call. Failures are recorded
    /// on status and not retried until the spec changes.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Resolve computed values (referenced secrets, accessors, selectors).
    async fn prepare(&mut self, _ctx: &ReconcileContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Drive the backend toward the desired state.
    async fn apply(&mut self, ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError>;

    /// Remove the backend resource. Only called when the resource is
    /// deletable and was successfully created at least once.
    async fn cleanup(&self, ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError>;

    /// Whether backend cleanup applies at all (retain policies say no).
    fn is_deletable(&self) -> bool {
        true
    }

    /// Kind-specific observed fields merged into the status patch
    /// (accessor, provisioning state, timestamps).
    fn status_fields(&self) -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone)]
pub struct Applied {
    /// Scheduled deadline for the next reconcile, when the kind has one.
    pub requeue_after: Option<Duration>,
    /// Condition message, e.g. "mounted kv engine at team-a/kv".
    pub summary: String,
}

/// The slice of object state the machine operates on, extracted from the
/// typed object by each reconciler so the machine itself stays testable
/// without an API server.
#[derive(Debug, Clone, Default)]
pub struct ObjectState {
    pub name: String,
    pub namespace: String,
    pub generation: Option<i64>,
    pub observed_generation: Option<i64>,
    pub deleting: bool,
    pub finalizers: Vec<String>,
    pub conditions: Vec<Condition>,
}

impl ObjectState {
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Predicate inputs derived from this object.
    #[must_use]
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        last_successful_time(&self.conditions)
    }

    #[must_use]
    pub fn retrying_failure(&self) -> bool {
        has_failed_condition(&self.conditions)
    }
}

/// Run one lifecycle transition for a resource.
pub async fn run_lifecycle<H: LifecycleHooks>(
    state: &ObjectState,
    finalizer: &str,
    hooks: &mut H,
    control_plane: &dyn ControlPlane,
    ctx: &ReconcileContext<'_>,
    policy: &SyncPolicy,
    now: DateTime<Utc>,
) -> Result<Action, ReconcileError> {
    if state.deleting {
        return finalize(state, finalizer, hooks, control_plane, ctx, now).await;
    }

    if let Err(e) = hooks.validate() {
        warn!(
            "Validation failed for {}/{}: {e}",
            state.namespace, state.name
        );
        let mut conds = state.conditions.clone();
        record_failure(&mut conds, failed(state.generation, &e.to_string(), now));
        patch_conditions(control_plane, &conds).await?;
        // A spec the user has to edit; retrying cannot help.
        return Ok(Action::await_change());
    }

    if let Err(e) = hooks.prepare(ctx).await {
        let mut conds = state.conditions.clone();
        record_failure(&mut conds, failed(state.generation, &e.to_string(), now));
        patch_conditions(control_plane, &conds).await?;
        return Err(ReconcileError::Failed(e));
    }

    match hooks.apply(ctx).await {
        Ok(applied) => {
            let mut conds = state.conditions.clone();
            record_success(&mut conds, successful(state.generation, &applied.summary, now));

            let mut status = hooks.status_fields();
            status.insert(
                "conditions".to_string(),
                serde_json::to_value(&conds).unwrap_or(Value::Null),
            );
            status.insert("observedGeneration".to_string(), json!(state.generation));
            control_plane
                .patch_status(Value::Object(status))
                .await
                .map_err(ReconcileError::Failed)?;

            // Finalizer only after the backend resource exists.
            control_plane
                .ensure_finalizer(finalizer)
                .await
                .map_err(ReconcileError::Failed)?;

            info!(
                "✅ Reconciled {}/{}: {}",
                state.namespace, state.name, applied.summary
            );
            Ok(applied
                .requeue_after
                .map(Action::requeue)
                .unwrap_or_else(|| policy.default_requeue()))
        }
        Err(e) => {
            let mut conds = state.conditions.clone();
            record_failure(&mut conds, failed(state.generation, &e.to_string(), now));
            patch_conditions(control_plane, &conds).await?;
            Err(e)
        }
    }
}

/// Deletion path: backend cleanup, then finalizer removal, then nothing
/// further. No status update is attempted on a vanishing object.
async fn finalize<H: LifecycleHooks>(
    state: &ObjectState,
    finalizer: &str,
    hooks: &mut H,
    control_plane: &dyn ControlPlane,
    ctx: &ReconcileContext<'_>,
    now: DateTime<Utc>,
) -> Result<Action, ReconcileError> {
    if !state.has_finalizer(finalizer) {
        // Nothing pins the object; the control plane will collect it.
        return Ok(Action::await_change());
    }

    if hooks.is_deletable() && was_created(&state.conditions) {
        if let Err(e) = hooks.cleanup(ctx).await {
            // Cleanup failed: the finalizer stays, the object is never
            // collected, and the failure is visible on status.
            let mut conds = state.conditions.clone();
            record_failure(&mut conds, failed(state.generation, &e.to_string(), now));
            let _ = patch_conditions(control_plane, &conds).await;
            return Err(e);
        }
        info!(
            "🧹 Backend cleanup complete for {}/{}",
            state.namespace, state.name
        );
    }

    control_plane
        .remove_finalizer(finalizer)
        .await
        .map_err(ReconcileError::Failed)?;
    info!("Finalizer removed for {}/{}", state.namespace, state.name);
    Ok(Action::await_change())
}

async fn patch_conditions(
    control_plane: &dyn ControlPlane,
    conds: &[Condition],
) -> Result<(), ReconcileError> {
    control_plane
        .patch_status(json!({ "conditions": conds }))
        .await
        .map_err(ReconcileError::Failed)
}

/// Validate the spec before any backend call, the session login
/// included. Returns the short-circuit action when the spec is invalid:
/// the failure lands on status and the resource waits for a spec change.
pub async fn reject_invalid<H: LifecycleHooks>(
    state: &ObjectState,
    hooks: &H,
    control_plane: &dyn ControlPlane,
    now: DateTime<Utc>,
) -> Result<Option<Action>, ReconcileError> {
    if state.deleting {
        return Ok(None);
    }
    match hooks.validate() {
        Ok(()) => Ok(None),
        Err(e) => {
            warn!(
                "Validation failed for {}/{}: {e}",
                state.namespace, state.name
            );
            let mut conds = state.conditions.clone();
            record_failure(&mut conds, failed(state.generation, &e.to_string(), now));
            patch_conditions(control_plane, &conds).await?;
            Ok(Some(Action::await_change()))
        }
    }
}

/// Evaluate the scheduling predicate for an object that is not being
/// deleted. Returns the action to short-circuit with, or `None` to
/// proceed with a full reconcile.
#[must_use]
pub fn gate(
    state: &ObjectState,
    policy: &SyncPolicy,
    schedule: Option<super::clock::ClockDecision>,
    now: DateTime<Utc>,
) -> Option<Action> {
    if state.deleting {
        return None;
    }
    let decision = policy.evaluate(&super::predicates::EvaluateInput {
        generation: state.generation,
        observed_generation: state.observed_generation,
        last_success: state.last_success(),
        retrying_failure: state.retrying_failure(),
        schedule,
        now,
    });
    match decision {
        Decision::Proceed(reason) => {
            info!(
                "🔄 Reconciling {}/{} (trigger source: {})",
                state.namespace,
                state.name,
                reason.as_str()
            );
            None
        }
        Decision::Skip { requeue_after } => Some(
            requeue_after
                .map(Action::requeue)
                .unwrap_or_else(Action::await_change),
        ),
    }
}

/// Kubernetes-backed [`ControlPlane`] for one object.
pub struct KubeControlPlane<K>
where
    K: kube::Resource,
{
    api: Api<K>,
    name: String,
    finalizers: Vec<String>,
}

impl<K> Debug for KubeControlPlane<K>
where
    K: kube::Resource,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeControlPlane")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<K> KubeControlPlane<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    #[must_use]
    pub fn new(api: Api<K>, name: &str, finalizers: Vec<String>) -> Self {
        Self {
            api,
            name: name.to_string(),
            finalizers,
        }
    }
}

#[async_trait]
impl<K> ControlPlane for KubeControlPlane<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync,
{
    async fn ensure_finalizer(&self, finalizer: &str) -> anyhow::Result<()> {
        if self.finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let mut finalizers = self.finalizers.clone();
        finalizers.push(finalizer.to_string());
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(&self, finalizer: &str) -> anyhow::Result<()> {
        let finalizers: Vec<&String> = self
            .finalizers
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .collect();
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_status(&self, status: Value) -> anyhow::Result<()> {
        let patch = json!({ "status": status });
        self.api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
