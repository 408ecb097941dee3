//! # PKIEngine CRD
//!
//! Declares a certificate authority: a PKI engine mount plus the one-way
//! generate/export/sign provisioning sequence and its URL/CRL
//! configuration documents.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::VaultAuthentication;
use super::engine::EngineTuneConfig;
use super::status::Condition;
use crate::vault::endpoint::PkiProvisioningState;

/// PKIEngine declares a root or intermediate certificate authority.
///
/// Generation is one-way: once the CA material exists, reconciliation will
/// never regenerate it. Rotating a CA means deleting and recreating the
/// resource.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.microscaler.io",
    version = "v1alpha1",
    kind = "PKIEngine",
    namespaced,
    status = "PKIEngineStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.provisioningState"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReconcileSuccessful\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PKIEngineSpec {
    /// Mount path of the PKI engine (e.g. "pki/intermediate")
    pub path: String,
    /// Root CA, or intermediate CA signed by a parent engine
    pub variant: PkiVariant,
    pub common_name: String,
    /// CA certificate TTL, Vault duration string
    #[serde(default)]
    pub ttl: Option<String>,
    #[serde(default = "default_key_type")]
    pub key_type: String,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    /// Export the CA private key at generation time
    #[serde(default)]
    pub export_private_key: bool,
    /// Desired config/urls document
    #[serde(default)]
    pub urls: Option<PkiUrls>,
    /// Desired config/crl document
    #[serde(default)]
    pub crl: Option<PkiCrlConfig>,
    #[serde(default)]
    pub tune: Option<EngineTuneConfig>,
    pub authentication: VaultAuthentication,
}

/// CA variant. Intermediates carry the parent they are signed by.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PkiVariant {
    Root,
    #[serde(rename_all = "camelCase")]
    Intermediate {
        /// Mount path of the parent PKI engine that signs this CA
        parent_mount: String,
    },
}

fn default_key_type() -> String {
    "rsa".to_string()
}

fn default_key_bits() -> u32 {
    2048
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PkiUrls {
    #[serde(default)]
    pub issuing_certificates: Vec<String>,
    #[serde(default)]
    pub crl_distribution_points: Vec<String>,
    #[serde(default)]
    pub ocsp_servers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PkiCrlConfig {
    /// CRL lifetime, Vault duration string
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub disable: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PKIEngineStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub accessor: Option<String>,
    /// One-way provisioning progression; never reset by reconciliation
    #[serde(default)]
    pub provisioning_state: PkiProvisioningState,
    /// CA certificate (root) or signed certificate (intermediate)
    #[serde(default)]
    pub certificate: Option<String>,
    /// CSR produced by intermediate generation, consumed by signing
    #[serde(default)]
    pub csr: Option<String>,
    /// Private key material, present only when export was requested
    #[serde(default)]
    pub exported_private_key: Option<String>,
}
