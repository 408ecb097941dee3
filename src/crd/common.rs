//! # Shared CRD Types
//!
//! Field types reused across every resource kind: the Vault authentication
//! reference, Kubernetes secret references, and namespace targeting.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::DEFAULT_AUTH_MOUNT;

/// How the controller authenticates to Vault on behalf of this resource.
///
/// The controller's projected service account JWT is exchanged for a
/// client token against the named Kubernetes auth engine mount.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultAuthentication {
    /// Auth engine mount used for the login exchange
    /// Defaults to "kubernetes"
    #[serde(default = "default_auth_mount")]
    pub path: String,
    /// Vault role bound to the controller's service account
    pub role: String,
    /// Vault namespace the session is scoped to (Vault Enterprise)
    /// Defaults to the controller-wide namespace when unset
    #[serde(default)]
    pub namespace: Option<String>,
}

pub fn default_auth_mount() -> String {
    DEFAULT_AUTH_MOUNT.to_string()
}

/// Reference to one key of a Kubernetes Secret.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    /// Defaults to the resource's own namespace
    #[serde(default)]
    pub namespace: Option<String>,
    pub key: String,
}

/// Namespace targeting for resources that fan out across namespaces.
///
/// Exactly one of the two fields may be set; setting both (or neither) is
/// a validation error that is reported on status and not retried until
/// the spec changes.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetNamespaces {
    /// Explicit list of target namespaces
    #[serde(default)]
    pub target_namespaces: Option<Vec<String>>,
    /// Label selector resolved against Namespace objects at reconcile time
    #[serde(default)]
    pub namespace_selector: Option<NamespaceSelector>,
}

/// Label selector over namespaces. Mirrors the Kubernetes selector shape
/// so it can be expressed in CRD schemas derived by schemars.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<SelectorRequirement>,
}

/// One selector requirement: `In`, `NotIn`, `Exists`, or `DoesNotExist`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl NamespaceSelector {
    /// Render the selector into Kubernetes label-selector string syntax
    /// for a List call, e.g. `env=prod,team in (a,b),!legacy`.
    pub fn to_query(&self) -> anyhow::Result<String> {
        let mut terms: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        for req in &self.match_expressions {
            let term = match req.operator.as_str() {
                "In" => format!("{} in ({})", req.key, req.values.join(",")),
                "NotIn" => format!("{} notin ({})", req.key, req.values.join(",")),
                "Exists" => req.key.clone(),
                "DoesNotExist" => format!("!{}", req.key),
                other => {
                    return Err(anyhow::anyhow!(
                        "unsupported selector operator '{other}' for key '{}'",
                        req.key
                    ));
                }
            };
            terms.push(term);
        }

        Ok(terms.join(","))
    }
}
