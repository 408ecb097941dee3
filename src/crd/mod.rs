//! # Custom Resource Definitions
//!
//! CRD types for every Vault resource kind the controller reconciles.
//!
//! ## Module Structure
//!
//! - `common.rs` - Vault authentication reference, secret references,
//!   namespace targeting
//! - `status.rs` - Conditions and the plain shared status
//! - `engine.rs` - SecretsEngine (engine mounts)
//! - `pki_engine.rs` - PKIEngine (certificate authorities)
//! - `audit_device.rs` - AuditDevice
//! - `policy.rs` - VaultPolicy (ACL policies)
//! - `role.rs` - KubernetesAuthRole
//! - `random_secret.rs` - RandomSecret (generated secrets)
//! - `database.rs` - DatabaseConnection (root credential rotation)

mod audit_device;
mod common;
mod database;
mod engine;
mod pki_engine;
mod policy;
mod random_secret;
mod role;
mod status;

pub use audit_device::{AuditDevice, AuditDeviceSpec};
pub use common::{
    default_auth_mount, NamespaceSelector, SecretKeyRef, SelectorRequirement, TargetNamespaces,
    VaultAuthentication,
};
pub use database::{DatabaseConnection, DatabaseConnectionSpec, DatabaseConnectionStatus};
pub use engine::{
    EngineTuneConfig, MountCategory, SecretsEngine, SecretsEngineSpec, SecretsEngineStatus,
};
pub use pki_engine::{
    PKIEngine, PKIEngineSpec, PKIEngineStatus, PkiCrlConfig, PkiUrls, PkiVariant,
};
pub use policy::{AccessorReference, VaultPolicy, VaultPolicySpec};
pub use random_secret::{RandomSecret, RandomSecretSpec, RandomSecretStatus};
pub use role::{KubernetesAuthRole, KubernetesAuthRoleSpec};
pub use status::{Condition, VaultResourceStatus};
