//! # DatabaseConnection CRD
//!
//! Declares a database secret engine connection configuration at
//! `<mount>/config/<name>`, with optional root credential rotation driven
//! by the rotation clock (`<mount>/rotate-root/<name>`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{SecretKeyRef, VaultAuthentication};
use super::status::Condition;

/// DatabaseConnection declares a database engine connection.
///
/// The initial password is resolved from a Kubernetes Secret; after the
/// first root rotation Vault owns the credential and the referenced
/// secret becomes irrelevant.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "DatabaseConnection",
    namespaced,
    status = "DatabaseConnectionStatus",
    printcolumn = r#"{"name":"LastRotation", "type":"string", "jsonPath":".status.lastRootRotation"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnectionSpec {
    /// Database secret engine mount
    pub mount: String,
    /// Connection name; defaults to the object name
    #[serde(default)]
    pub name: Option<String>,
    /// Database plugin ("postgresql-database-plugin", ...)
    pub plugin_name: String,
    /// Connection URL template, e.g.
    /// "postgresql://{{username}}:{{password}}@db:5432/app"
    pub connection_url: String,
    pub username: String,
    /// Kubernetes Secret holding the initial root password
    pub password_secret: SecretKeyRef,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default = "default_verify_connection")]
    pub verify_connection: bool,
    /// Root credential rotation period, Vault duration string. Unset
    /// means the root credential is rotated once and never again.
    #[serde(default)]
    pub rotation_period: Option<String>,
    pub authentication: VaultAuthentication,
}

fn default_verify_connection() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnectionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// RFC 3339 timestamp of the last root credential rotation
    #[serde(default)]
    pub last_root_rotation: Option<String>,
}
