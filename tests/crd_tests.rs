//! CRD schema behavior: serde defaults, generated CRD metadata, and
//! spec-level validation through the lifecycle hooks.

use kube::core::CustomResourceExt;
use serde_json::json;

use vault_resource_controller::controller::lifecycle::LifecycleHooks;
use vault_resource_controller::controller::roles::RoleHooks;
use vault_resource_controller::crd::{
    AuditDevice, DatabaseConnection, KubernetesAuthRole, KubernetesAuthRoleSpec, MountCategory,
    PKIEngine, RandomSecret, RandomSecretSpec, SecretsEngine, SecretsEngineSpec,
    TargetNamespaces, VaultPolicy,
};

#[test]
fn engine_spec_defaults() {
    let spec: SecretsEngineSpec = serde_json::from_value(json!({
        "path": "team-a/kv",
        "engineType": "kv",
        "authentication": { "role": "controller" },
    }))
    .unwrap();

    assert_eq!(spec.category, MountCategory::Secret);
    assert_eq!(spec.authentication.path, "kubernetes");
    assert_eq!(spec.mount_path(), "sys/mounts/team-a/kv");
}

#[test]
fn auth_engine_mounts_under_sys_auth() {
    let spec: SecretsEngineSpec = serde_json::from_value(json!({
        "path": "kubernetes-workload",
        "engineType": "kubernetes",
        "category": "auth",
        "authentication": { "role": "controller" },
    }))
    .unwrap();
    assert_eq!(spec.mount_path(), "sys/auth/kubernetes-workload");
}

#[test]
fn random_secret_defaults() {
    let spec: RandomSecretSpec = serde_json::from_value(json!({
        "mount": "team-a/kv",
        "passwordPolicy": "strong",
        "authentication": { "role": "controller" },
    }))
    .unwrap();
    assert_eq!(spec.key, "password");
    assert!(spec.refresh_period.is_none());
}

#[test]
fn crd_manifests_carry_group_and_kind() {
    for (crd, expected_kind) in [
        (SecretsEngine::crd(), "SecretsEngine"),
        (PKIEngine::crd(), "PKIEngine"),
        (AuditDevice::crd(), "AuditDevice"),
        (VaultPolicy::crd(), "VaultPolicy"),
        (KubernetesAuthRole::crd(), "KubernetesAuthRole"),
        (RandomSecret::crd(), "RandomSecret"),
        (DatabaseConnection::crd(), "DatabaseConnection"),
    ] {
        assert_eq!(crd.spec.group, "vault.microscaler.io");
        assert_eq!(crd.spec.names.kind, expected_kind);
    }
}

fn role_spec(target: TargetNamespaces) -> KubernetesAuthRoleSpec {
    serde_json::from_value(json!({
        "policies": ["reader"],
        "serviceAccounts": ["app"],
        "authentication": { "role": "controller" },
    }))
    .map(|mut spec: KubernetesAuthRoleSpec| {
        spec.target = target;
        spec
    })
    .unwrap()
}

#[test]
fn conflicting_namespace_targeting_is_rejected_before_any_backend_call() {
    let conflicting = TargetNamespaces {
        target_namespaces: Some(vec!["a".to_string()]),
        namespace_selector: Some(serde_json::from_value(json!({"matchLabels": {"env": "prod"}})).unwrap()),
    };
    let hooks = RoleHooks::new(KubernetesAuthRole::new("role", role_spec(conflicting)));
    let err = hooks.validate().unwrap_err();
    assert!(err.to_string().contains("mutually exclusive"));

    let valid = TargetNamespaces {
        target_namespaces: Some(vec!["a".to_string()]),
        namespace_selector: None,
    };
    let hooks = RoleHooks::new(KubernetesAuthRole::new("role", role_spec(valid)));
    assert!(hooks.validate().is_ok());
}
