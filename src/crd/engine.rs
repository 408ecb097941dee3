//! # SecretsEngine CRD
//!
//! Declares an engine mount: a secret engine under `sys/mounts` or an auth
//! engine under `sys/auth`, together with its tune configuration.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::VaultAuthentication;
use super::status::Condition;

/// SecretsEngine declares a Vault engine mount.
///
/// # Example
///
/// ```yaml
/// apiVersion: vault.microscaler.io/v1alpha1
/// kind: SecretsEngine
/// metadata:
///   name: team-kv
///   namespace: team-a
/// spec:
///   path: team-a/kv
///   engineType: kv
///   config:
///     maxLeaseTtl: "1h"
///   authentication:
///     role: vault-resource-controller
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "SecretsEngine",
    namespaced,
    status = "SecretsEngineStatus",
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecretsEngineSpec {
    /// Mount path, relative to sys/mounts or sys/auth (e.g. "team-a/kv")
    pub path: String,
    /// Engine type ("kv", "database", "rabbitmq", "kubernetes", ...)
    pub engine_type: String,
    /// Whether this is a secret engine or an auth engine
    #[serde(default)]
    pub category: MountCategory,
    #[serde(default)]
    pub description: Option<String>,
    /// Tune configuration, applied at mount time and reconciled on drift
    #[serde(default)]
    pub config: Option<EngineTuneConfig>,
    /// Engine options forwarded verbatim (e.g. {"version": "2"} for kv-v2)
    #[serde(default)]
    pub options: Option<BTreeMap<String, String>>,
    pub authentication: VaultAuthentication,
}

/// Engine family: decides the parent listing path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MountCategory {
    #[default]
    Secret,
    Auth,
}

impl MountCategory {
    /// Parent path under which mounts of this category are listed.
    #[must_use]
    pub fn parent(&self) -> &'static str {
        match self {
            MountCategory::Secret => "sys/mounts",
            MountCategory::Auth => "sys/auth",
        }
    }
}

/// Tune settings. TTLs use Vault duration strings ("30m", "1h").
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineTuneConfig {
    #[serde(default)]
    pub default_lease_ttl: Option<String>,
    #[serde(default)]
    pub max_lease_ttl: Option<String>,
    /// "unauth" to expose the mount in unauthenticated listings
    #[serde(default)]
    pub listing_visibility: Option<String>,
}

impl SecretsEngineSpec {
    /// Full backend path of the mount document.
    #[must_use]
    pub fn mount_path(&self) -> String {
        format!("{}/{}", self.category.parent(), self.path.trim_matches('/'))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretsEngineStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Backend-assigned accessor, round-tripped from the mount listing
    #[serde(default)]
    pub accessor: Option<String>,
}
