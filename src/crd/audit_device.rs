//! # AuditDevice CRD
//!
//! Declares an audit device under `sys/audit`. Audit devices have no
//! in-place update: option changes are applied by disabling and
//! re-enabling the device.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::VaultAuthentication;
use super::status::VaultResourceStatus;

/// AuditDevice declares a Vault audit device.
///
/// # Example
///
/// ```yaml
/// apiVersion: vault.microscaler.io/v1alpha1
/// kind: AuditDevice
/// metadata:
///   name: file-audit
/// spec:
///   deviceType: file
///   options:
///     file_path: /vault/audit/audit.log
///   authentication:
///     role: vault-resource-controller
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "AuditDevice",
    namespaced,
    status = "VaultResourceStatus",
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuditDeviceSpec {
    /// Device name under sys/audit; defaults to the object name
    #[serde(default)]
    pub path: Option<String>,
    /// Device type: "file", "syslog", or "socket"
    pub device_type: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the device is local to this Vault node (not replicated)
    #[serde(default)]
    pub local: bool,
    /// Device options (e.g. file_path for the file type)
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub authentication: VaultAuthentication,
}
