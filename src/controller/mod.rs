//! # Controller Machinery
//!
//! The reconciliation state machine, scheduling predicates, rotation
//! clock, condition bookkeeping, and one reconciler module per resource
//! kind. Everything here is wired from `main` through a single immutable
//! [`ControllerContext`].

pub mod backoff;
pub mod clock;
pub mod conditions;
pub mod lifecycle;
pub mod predicates;
pub mod reader;
pub mod validation;

pub mod audit_devices;
pub mod database_connections;
pub mod engines;
pub mod pki_engines;
pub mod policies;
pub mod random_secrets;
pub mod roles;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use thiserror::Error;
use tracing::warn;

use crate::constants::{
    BACKOFF_MAX_MINUTES, BACKOFF_MIN_MINUTES, DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
};
use crate::crd::VaultAuthentication;
use crate::observability::metrics;
use crate::vault::session::{establish, JwtSource, KubernetesJwtLogin, VaultConnection};
use crate::vault::{HttpVaultClient, VaultError};

use backoff::FibonacciBackoff;
use predicates::SyncPolicy;

/// Errors crossing the controller boundary. kube-runtime requires a typed
/// error here; everything else in the flow uses anyhow for enrichment.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("vault request failed: {0}")]
    Vault(#[from] VaultError),

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("reconciliation failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Connection settings for the Vault server, read once at startup.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub address: String,
    /// Controller-wide default Vault namespace (Vault Enterprise)
    pub namespace: Option<String>,
    /// Path of the projected service account token used for logins
    pub jwt_path: PathBuf,
}

/// Per-resource backoff bookkeeping for the error policy.
#[derive(Debug, Clone)]
pub struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(BACKOFF_MIN_MINUTES, BACKOFF_MAX_MINUTES),
            error_count: 0,
        }
    }

    fn next(&mut self) -> Duration {
        self.error_count += 1;
        self.backoff.next_backoff()
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared, immutable wiring for every reconciler. Constructed once in
/// `main`; reconcilers only ever read from it (the backoff map is the one
/// interior-mutable piece and is keyed per resource).
pub struct ControllerContext {
    pub client: Client,
    pub settings: VaultSettings,
    pub sync_policy: SyncPolicy,
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ControllerContext {
    #[must_use]
    pub fn new(client: Client, settings: VaultSettings, sync_policy: SyncPolicy) -> Self {
        Self {
            client,
            settings,
            sync_policy,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Establish a fresh Vault session for one reconcile. Sessions are
    /// never cached across reconciles, so token expiry can cost at most
    /// one attempt.
    pub async fn vault_session(
        &self,
        auth: &VaultAuthentication,
    ) -> Result<HttpVaultClient, VaultError> {
        let strategy = KubernetesJwtLogin {
            mount: auth.path.clone(),
            role: auth.role.clone(),
            jwt: JwtSource::File(self.settings.jwt_path.clone()),
        };
        let connection = VaultConnection {
            address: self.settings.address.clone(),
            namespace: auth
                .namespace
                .clone()
                .or_else(|| self.settings.namespace.clone()),
        };
        establish(&connection, &strategy).await
    }

    /// Reset the error backoff after a successful reconcile.
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }

    fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                let duration = state.next();
                (duration, state.error_count)
            }
            Err(_) => (
                Duration::from_secs(DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS),
                0,
            ),
        }
    }
}

/// Key identifying one object in the backoff map.
#[must_use]
pub fn resource_key<K: ResourceExt>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any()
    )
}

/// Shared error policy: progressive Fibonacci backoff per resource.
pub fn error_policy<K: ResourceExt>(
    obj: Arc<K>,
    error: &ReconcileError,
    ctx: Arc<ControllerContext>,
    kind: &str,
) -> Action {
    let key = resource_key(obj.as_ref());
    let (backoff, error_count) = ctx.next_backoff(&key);
    metrics::increment_reconciliation_errors(kind);
    warn!(
        "❌ Reconciliation error for {kind} {key} (attempt {error_count}): {error}. Retrying in {}s",
        backoff.as_secs()
    );
    Action::requeue(backoff)
}
