//! State machine behavior against the in-memory control plane: finalizer
//! ordering, cleanup gating, validation short-circuits, and the one-off
//! generated-secret policy.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{MemoryControlPlane, MemoryReader, RecordingVault};
use serde_json::json;

use vault_resource_controller::controller::clock::ClockDecision;
use vault_resource_controller::controller::conditions::{
    successful, CONDITION_RECONCILE_FAILED, CONDITION_RECONCILE_SUCCESSFUL,
};
use vault_resource_controller::controller::lifecycle::{
    run_lifecycle, Applied, LifecycleHooks, ObjectState,
};
use vault_resource_controller::controller::predicates::SyncPolicy;
use vault_resource_controller::controller::random_secrets::RandomSecretHooks;
use vault_resource_controller::controller::ReconcileError;
use vault_resource_controller::crd::{
    RandomSecret, RandomSecretSpec, RandomSecretStatus, VaultAuthentication,
};
use vault_resource_controller::vault::contract::ReconcileContext;
use vault_resource_controller::vault::error::VaultError;

const FINALIZER: &str = "vault.microscaler.io/test-cleanup";

/// Stub hooks with scriptable apply/cleanup outcomes.
struct StubHooks {
    apply_fails: bool,
    cleanup_fails: bool,
    validation_error: Option<String>,
    cleanup_called: AtomicBool,
    apply_called: AtomicBool,
}

impl StubHooks {
    fn ok() -> Self {
        Self {
            apply_fails: false,
            cleanup_fails: false,
            validation_error: None,
            cleanup_called: AtomicBool::new(false),
            apply_called: AtomicBool::new(false),
        }
    }

    fn failing_cleanup() -> Self {
        Self {
            cleanup_fails: true,
            ..Self::ok()
        }
    }

    fn failing_apply() -> Self {
        Self {
            apply_fails: true,
            ..Self::ok()
        }
    }

    fn invalid(message: &str) -> Self {
        Self {
            validation_error: Some(message.to_string()),
            ..Self::ok()
        }
    }
}

fn backend_error() -> ReconcileError {
    ReconcileError::Vault(VaultError::Api {
        path: "kv/app".to_string(),
        status: 503,
        message: "sealed".to_string(),
    })
}

#[async_trait]
impl LifecycleHooks for StubHooks {
    fn validate(&self) -> anyhow::Result<()> {
        match &self.validation_error {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn apply(&mut self, _ctx: &ReconcileContext<'_>) -> Result<Applied, ReconcileError> {
        self.apply_called.store(true, Ordering::Relaxed);
        if self.apply_fails {
            return Err(backend_error());
        }
        Ok(Applied {
            requeue_after: None,
            summary: "backend in sync".to_string(),
        })
    }

    async fn cleanup(&self, _ctx: &ReconcileContext<'_>) -> Result<(), ReconcileError> {
        self.cleanup_called.store(true, Ordering::Relaxed);
        if self.cleanup_fails {
            return Err(backend_error());
        }
        Ok(())
    }
}

fn fresh_object() -> ObjectState {
    ObjectState {
        name: "app".to_string(),
        namespace: "team-a".to_string(),
        generation: Some(1),
        observed_generation: None,
        deleting: false,
        finalizers: vec![],
        conditions: vec![],
    }
}

fn created_object() -> ObjectState {
    ObjectState {
        observed_generation: Some(1),
        finalizers: vec![FINALIZER.to_string()],
        conditions: vec![successful(Some(1), "backend in sync", Utc::now())],
        ..fresh_object()
    }
}

fn deleting(mut state: ObjectState) -> ObjectState {
    state.deleting = true;
    state
}

async fn run(
    state: &ObjectState,
    hooks: &mut StubHooks,
    cp: &MemoryControlPlane,
) -> Result<kube_runtime::controller::Action, ReconcileError> {
    let vault = RecordingVault::new();
    let reader = MemoryReader::new();
    let ctx = ReconcileContext {
        vault: &vault,
        reader: &reader,
        vault_namespace: None,
    };
    run_lifecycle(
        state,
        FINALIZER,
        hooks,
        cp,
        &ctx,
        &SyncPolicy::default(),
        Utc::now(),
    )
    .await
}

fn condition_types(cp: &MemoryControlPlane) -> Vec<String> {
    cp.last_status()
        .and_then(|s| s.get("conditions").cloned())
        .and_then(|c| serde_json::from_value::<Vec<serde_json::Value>>(c).ok())
        .map(|conds| {
            conds
                .iter()
                .filter_map(|c| c.get("type").and_then(|t| t.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn successful_create_attaches_finalizer_after_status() {
    let cp = MemoryControlPlane::new();
    let mut hooks = StubHooks::ok();

    run(&fresh_object(), &mut hooks, &cp).await.unwrap();

    assert!(cp.has_finalizer(FINALIZER));
    assert!(condition_types(&cp).contains(&CONDITION_RECONCILE_SUCCESSFUL.to_string()));
    // Condition bookkeeping lands before the finalizer attach.
    assert_eq!(
        cp.operations(),
        vec!["patch_status".to_string(), "ensure_finalizer".to_string()]
    );
    let status = cp.last_status().unwrap();
    assert_eq!(status.get("observedGeneration"), Some(&json!(1)));
}

#[tokio::test]
async fn failed_apply_records_condition_and_no_finalizer() {
    let cp = MemoryControlPlane::new();
    let mut hooks = StubHooks::failing_apply();

    let err = run(&fresh_object(), &mut hooks, &cp).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Vault(_)));
    assert!(!cp.has_finalizer(FINALIZER));
    assert!(condition_types(&cp).contains(&CONDITION_RECONCILE_FAILED.to_string()));
}

#[tokio::test]
async fn validation_failure_never_touches_backend_and_awaits_spec_change() {
    let cp = MemoryControlPlane::new();
    let mut hooks = StubHooks::invalid("mutually exclusive namespace selectors");

    // A validation error is terminal for this spec: Ok, not Err, so the
    // error policy does not schedule retries.
    run(&fresh_object(), &mut hooks, &cp).await.unwrap();

    assert!(!hooks.apply_called.load(Ordering::Relaxed));
    assert!(!cp.has_finalizer(FINALIZER));
    assert!(condition_types(&cp).contains(&CONDITION_RECONCILE_FAILED.to_string()));
}

#[tokio::test]
async fn cleanup_failure_keeps_finalizer_and_failed_condition() {
    let cp = MemoryControlPlane::new();
    cp.finalizers.lock().unwrap().push(FINALIZER.to_string());
    let mut hooks = StubHooks::failing_cleanup();

    let err = run(&deleting(created_object()), &mut hooks, &cp)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Vault(_)));

    // Never finalized: the object must not be garbage-collected.
    assert!(cp.has_finalizer(FINALIZER));
    assert!(condition_types(&cp).contains(&CONDITION_RECONCILE_FAILED.to_string()));
}

#[tokio::test]
async fn successful_cleanup_removes_finalizer_without_status_update() {
    let cp = MemoryControlPlane::new();
    cp.finalizers.lock().unwrap().push(FINALIZER.to_string());
    let mut hooks = StubHooks::ok();

    run(&deleting(created_object()), &mut hooks, &cp)
        .await
        .unwrap();

    assert!(hooks.cleanup_called.load(Ordering::Relaxed));
    assert!(!cp.has_finalizer(FINALIZER));
    // No status write on a vanishing object.
    assert_eq!(cp.operations(), vec!["remove_finalizer".to_string()]);
}

#[tokio::test]
async fn cleanup_is_skipped_when_never_created() {
    let cp = MemoryControlPlane::new();
    cp.finalizers.lock().unwrap().push(FINALIZER.to_string());
    let mut hooks = StubHooks::ok();

    // Finalizer present but no successful condition: backend cleanup is
    // skipped, the finalizer still comes off.
    let mut state = fresh_object();
    state.finalizers = vec![FINALIZER.to_string()];
    run(&deleting(state), &mut hooks, &cp).await.unwrap();

    assert!(!hooks.cleanup_called.load(Ordering::Relaxed));
    assert!(!cp.has_finalizer(FINALIZER));
}

#[tokio::test]
async fn one_off_secret_is_never_rewritten_even_if_backend_lost_it() {
    // A RandomSecret without a refresh period, already generated once
    // (status.lastUpdated set), whose backend document was deleted
    // out-of-band: the decision is keyed off local status, so nothing is
    // regenerated.
    let mut resource = RandomSecret::new(
        "one-off",
        RandomSecretSpec {
            mount: "team-a/kv".to_string(),
            name: None,
            password_policy: "strong".to_string(),
            key: "password".to_string(),
            refresh_period: None,
            authentication: VaultAuthentication {
                path: "kubernetes".to_string(),
                role: "controller".to_string(),
                namespace: None,
            },
        },
    );
    resource.status = Some(RandomSecretStatus {
        last_updated: Some((Utc::now() - chrono::Duration::days(30)).to_rfc3339()),
        ..Default::default()
    });

    let now = Utc::now();
    let mut hooks = RandomSecretHooks::new(resource, now);
    assert_eq!(hooks.decision(), ClockDecision::Never);

    let vault = RecordingVault::new(); // backend holds nothing
    let reader = MemoryReader::new();
    let ctx = ReconcileContext {
        vault: &vault,
        reader: &reader,
        vault_namespace: None,
    };

    hooks.prepare(&ctx).await.unwrap();
    let applied = hooks.apply(&ctx).await.unwrap();

    assert!(vault.calls().is_empty(), "one-off secret must stay untouched");
    assert!(applied.summary.contains("already generated"));
}

#[tokio::test]
async fn fresh_random_secret_generates_and_schedules_refresh() {
    let mut resource = RandomSecret::new(
        "fresh",
        RandomSecretSpec {
            mount: "team-a/kv".to_string(),
            name: None,
            password_policy: "strong".to_string(),
            key: "password".to_string(),
            refresh_period: Some("1h".to_string()),
            authentication: VaultAuthentication {
                path: "kubernetes".to_string(),
                role: "controller".to_string(),
                namespace: None,
            },
        },
    );
    resource.metadata.namespace = Some("team-a".to_string());

    let now = Utc::now();
    let mut hooks = RandomSecretHooks::new(resource, now);
    assert_eq!(hooks.decision(), ClockDecision::RunNow);

    let vault = RecordingVault::new();
    vault.seed(
        "sys/policies/password/strong/generate",
        json!({ "password": "hunter2-but-random" }),
    );
    let reader = MemoryReader::new();
    let ctx = ReconcileContext {
        vault: &vault,
        reader: &reader,
        vault_namespace: None,
    };

    hooks.prepare(&ctx).await.unwrap();
    let applied = hooks.apply(&ctx).await.unwrap();

    let stored = vault.document("team-a/kv/fresh").expect("secret written");
    assert_eq!(
        stored.get("password").and_then(|p| p.as_str()),
        Some("hunter2-but-random")
    );
    assert_eq!(
        applied.requeue_after,
        Some(std::time::Duration::from_secs(3600))
    );
}
