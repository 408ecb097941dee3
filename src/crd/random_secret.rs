//! # RandomSecret CRD
//!
//! Declares a generated secret: a value produced by a Vault password
//! policy and written once to a KV path, optionally refreshed on a period.
//!
//! Without a refresh period the secret is written exactly once, keyed off
//! `status.lastUpdated`, never off backend existence. A one-off secret
//! deleted out-of-band stays deleted; overwriting it silently would hand
//! out a different credential than the one consumers captured.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::VaultAuthentication;
use super::status::Condition;

/// RandomSecret declares a generated secret under a KV mount.
///
/// # Example
///
/// ```yaml
/// apiVersion: vault.microscaler.io/v1alpha1
/// kind: RandomSecret
/// metadata:
///   name: app-db-password
///   namespace: team-a
/// spec:
///   mount: team-a/kv
///   passwordPolicy: strong-passwords
///   refreshPeriod: 720h
///   authentication:
///     role: vault-resource-controller
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "RandomSecret",
    namespaced,
    status = "RandomSecretStatus",
    printcolumn = r#"{"name":"LastUpdated", "type":"string", "jsonPath":".status.lastUpdated"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RandomSecretSpec {
    /// KV mount the secret is written under
    pub mount: String,
    /// Secret path under the mount; defaults to the object name
    #[serde(default)]
    pub name: Option<String>,
    /// Vault password policy used to generate the value
    pub password_policy: String,
    /// Key the generated value is stored under
    #[serde(default = "default_secret_key")]
    pub key: String,
    /// Regeneration period, Vault duration string. Unset means the secret
    /// is generated exactly once and never refreshed.
    #[serde(default)]
    pub refresh_period: Option<String>,
    pub authentication: VaultAuthentication,
}

fn default_secret_key() -> String {
    "password".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RandomSecretStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// RFC 3339 timestamp of the last generation/refresh
    #[serde(default)]
    pub last_updated: Option<String>,
}
