//! # CRD Generator
//!
//! Prints the CustomResourceDefinition manifests for every resource kind
//! to stdout, for piping into `kubectl apply -f -` or committing to the
//! deployment repo.

use kube::core::CustomResourceExt;

use vault_resource_controller::crd::{
    AuditDevice, DatabaseConnection, KubernetesAuthRole, PKIEngine, RandomSecret, SecretsEngine,
    VaultPolicy,
};

fn main() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&SecretsEngine::crd())?,
        serde_yaml::to_string(&PKIEngine::crd())?,
        serde_yaml::to_string(&AuditDevice::crd())?,
        serde_yaml::to_string(&VaultPolicy::crd())?,
        serde_yaml::to_string(&KubernetesAuthRole::crd())?,
        serde_yaml::to_string(&RandomSecret::crd())?,
        serde_yaml::to_string(&DatabaseConnection::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}
