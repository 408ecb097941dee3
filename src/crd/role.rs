//! # KubernetesAuthRole CRD
//!
//! Declares a role under a Kubernetes auth engine mount
//! (`auth/<mount>/role/<name>`), binding service accounts across a set of
//! namespaces to Vault policies. The namespace set is either an explicit
//! list or a label selector resolved at reconcile time, never both.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{default_auth_mount, TargetNamespaces, VaultAuthentication};
use super::status::VaultResourceStatus;

/// KubernetesAuthRole declares a Kubernetes auth engine role.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "KubernetesAuthRole",
    namespaced,
    status = "VaultResourceStatus",
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesAuthRoleSpec {
    /// Auth engine mount the role lives under
    #[serde(default = "default_auth_mount")]
    pub mount: String,
    /// Role name; defaults to the object name
    #[serde(default)]
    pub name: Option<String>,
    /// Vault policies granted by this role
    pub policies: Vec<String>,
    /// Service account names bound to the role
    pub service_accounts: Vec<String>,
    /// Namespaces the service accounts may authenticate from
    #[serde(default)]
    pub target: TargetNamespaces,
    /// Token TTL, Vault duration string
    #[serde(default)]
    pub token_ttl: Option<String>,
    pub authentication: VaultAuthentication,
}
