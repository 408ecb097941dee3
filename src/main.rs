//! # Vault Resource Controller
//!
//! A Kubernetes controller that reconciles declarative Vault resources
//! against a Vault server.
//!
//! ## Overview
//!
//! 1. **Watches custom resources** - SecretsEngine, PKIEngine,
//!    AuditDevice, VaultPolicy, KubernetesAuthRole, RandomSecret,
//!    DatabaseConnection, across all namespaces
//! 2. **Authenticates to Vault** - exchanges the controller's service
//!    account JWT for a short-lived Vault session, per reconcile
//! 3. **Converges the backend** - idempotent read-compare-write against
//!    the Vault HTTP API; zero writes when nothing drifted
//! 4. **Reports outcome** - status conditions, finalizer-backed cleanup,
//!    Prometheus metrics, and health probes
//!
//! ## Configuration
//!
//! - `VAULT_ADDR` - Vault server address (required)
//! - `VAULT_NAMESPACE` - default Vault namespace (optional)
//! - `VAULT_JWT_PATH` - service account token path (optional)
//! - `DRIFT_DETECTION_INTERVAL` - enable periodic drift reconciliation,
//!   e.g. "30m" (optional, off by default)
//! - `METRICS_PORT` - metrics/probe server port (default 5000)

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use kube::Client;
use tracing::{error, info};

use vault_resource_controller::constants::{
    DEFAULT_JWT_PATH, DEFAULT_METRICS_PORT, ENV_DRIFT_DETECTION_INTERVAL, ENV_METRICS_PORT,
    ENV_VAULT_ADDR, ENV_VAULT_JWT_PATH, ENV_VAULT_NAMESPACE,
};
use vault_resource_controller::controller::predicates::SyncPolicy;
use vault_resource_controller::controller::{
    audit_devices, database_connections, engines, pki_engines, policies, random_secrets, roles,
    ControllerContext, VaultSettings,
};
use vault_resource_controller::observability;
use vault_resource_controller::observability::server::{start_server, ServerState};
use vault_resource_controller::vault::duration::parse_vault_duration;

#[tokio::main]
async fn main() -> Result<()> {
    // kube's rustls-tls needs a process-wide crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault_resource_controller=info".into()),
        )
        .init();

    info!("Starting Vault Resource Controller");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    let server_port = std::env::var(ENV_METRICS_PORT)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);

    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let settings = settings_from_env()?;
    let sync_policy = sync_policy_from_env()?;
    info!(
        "Vault backend: {} (namespace: {})",
        settings.address,
        settings.namespace.as_deref().unwrap_or("none")
    );

    let client = Client::try_default().await?;
    let ctx = Arc::new(ControllerContext::new(client, settings, sync_policy));

    server_state.is_ready.store(true, Ordering::Relaxed);

    // One controller per kind; each serializes events per object, so
    // distinct objects reconcile concurrently with no shared mutable
    // state beyond the context.
    tokio::try_join!(
        engines::run(Arc::clone(&ctx)),
        pki_engines::run(Arc::clone(&ctx)),
        audit_devices::run(Arc::clone(&ctx)),
        policies::run(Arc::clone(&ctx)),
        roles::run(Arc::clone(&ctx)),
        random_secrets::run(Arc::clone(&ctx)),
        database_connections::run(Arc::clone(&ctx)),
    )?;

    info!("Controller stopped");
    Ok(())
}

fn settings_from_env() -> Result<VaultSettings> {
    let address = std::env::var(ENV_VAULT_ADDR)
        .with_context(|| format!("{ENV_VAULT_ADDR} must be set to the Vault server address"))?;
    let namespace = std::env::var(ENV_VAULT_NAMESPACE).ok().filter(|ns| !ns.is_empty());
    let jwt_path = std::env::var(ENV_VAULT_JWT_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_JWT_PATH));
    Ok(VaultSettings {
        address,
        namespace,
        jwt_path,
    })
}

fn sync_policy_from_env() -> Result<SyncPolicy> {
    let interval = match std::env::var(ENV_DRIFT_DETECTION_INTERVAL) {
        Ok(raw) if !raw.is_empty() => {
            let interval = parse_vault_duration(&raw).with_context(|| {
                format!("{ENV_DRIFT_DETECTION_INTERVAL} '{raw}' is not a valid duration")
            })?;
            info!("Drift detection enabled every {}s", interval.as_secs());
            Some(interval)
        }
        _ => None,
    };
    Ok(SyncPolicy::new(interval))
}
