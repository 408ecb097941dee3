//! # VaultPolicy CRD
//!
//! Declares an ACL policy document at `sys/policies/acl/<name>`. The
//! policy text may reference engine accessors through
//! `{{accessor:<reference>}}` placeholders, resolved at reconcile time
//! from the referenced SecretsEngine's status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::VaultAuthentication;
use super::status::VaultResourceStatus;

/// VaultPolicy declares an ACL policy.
///
/// # Example
///
/// ```yaml
/// apiVersion: vault.microscaler.io/v1alpha1
/// kind: VaultPolicy
/// metadata:
///   name: team-a-read
///   namespace: team-a
/// spec:
///   policy: |
///     path "team-a/kv/*" {
///       capabilities = ["read", "list"]
///     }
///   authentication:
///     role: vault-resource-controller
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "VaultPolicy",
    namespaced,
    status = "VaultResourceStatus",
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VaultPolicySpec {
    /// Policy name; defaults to the object name
    #[serde(default)]
    pub name: Option<String>,
    /// Policy document in HCL. May contain `{{accessor:<ref>}}`
    /// placeholders naming entries of `accessorReferences`.
    pub policy: String,
    /// SecretsEngine resources whose backend accessors are substituted
    /// into the policy text
    #[serde(default)]
    pub accessor_references: Vec<AccessorReference>,
    pub authentication: VaultAuthentication,
}

/// Reference to a SecretsEngine whose accessor feeds the policy template.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessorReference {
    /// Name of the SecretsEngine object, also the placeholder key
    pub name: String,
    /// Defaults to the policy's own namespace
    #[serde(default)]
    pub namespace: Option<String>,
}
