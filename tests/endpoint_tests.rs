//! Endpoint behavior against a recording in-memory Vault: idempotency,
//! delete idempotence, the audit disable-then-enable protocol, the PKI
//! one-way state machine, and the engine mount/tune flow.

mod common;

use common::{MemoryReader, RecordingVault, VaultCall};
use serde_json::json;

use vault_resource_controller::controller::audit_devices::AuditHooks;
use vault_resource_controller::controller::engines::EngineHooks;
use vault_resource_controller::controller::pki_engines::PkiHooks;
use vault_resource_controller::controller::policies::PolicyHooks;
use vault_resource_controller::crd::{
    AuditDevice, AuditDeviceSpec, EngineTuneConfig, MountCategory, PKIEngine, PKIEngineSpec,
    PKIEngineStatus, PkiVariant, SecretsEngine, SecretsEngineSpec, VaultAuthentication,
    VaultPolicy, VaultPolicySpec,
};
use vault_resource_controller::vault::contract::ReconcileContext;
use vault_resource_controller::vault::endpoint::{
    AuditEndpoint, EngineEndpoint, EngineResource, GenericEndpoint, PkiEndpoint,
    PkiProvisioningState, PkiResource, WriteOutcome,
};

fn auth() -> VaultAuthentication {
    VaultAuthentication {
        path: "kubernetes".to_string(),
        role: "controller".to_string(),
        namespace: None,
    }
}

fn policy(name: &str, text: &str) -> PolicyHooks {
    PolicyHooks::new(VaultPolicy::new(
        name,
        VaultPolicySpec {
            name: None,
            policy: text.to_string(),
            accessor_references: vec![],
            authentication: auth(),
        },
    ))
}

fn engine(path: &str, max_ttl: Option<&str>) -> EngineHooks {
    EngineHooks::new(SecretsEngine::new(
        "engine",
        SecretsEngineSpec {
            path: path.to_string(),
            engine_type: "kv".to_string(),
            category: MountCategory::Secret,
            description: None,
            config: max_ttl.map(|ttl| EngineTuneConfig {
                default_lease_ttl: None,
                max_lease_ttl: Some(ttl.to_string()),
                listing_visibility: None,
            }),
            options: None,
            authentication: auth(),
        },
    ))
}

fn audit_device(local: bool) -> AuditHooks {
    AuditHooks::new(AuditDevice::new(
        "file-audit",
        AuditDeviceSpec {
            path: None,
            device_type: "file".to_string(),
            description: None,
            local,
            options: [("file_path".to_string(), "/vault/audit.log".to_string())].into(),
            authentication: auth(),
        },
    ))
}

fn pki_root(state: PkiProvisioningState) -> PkiHooks {
    let mut resource = PKIEngine::new(
        "root-ca",
        PKIEngineSpec {
            path: "pki-root".to_string(),
            variant: PkiVariant::Root,
            common_name: "example.internal".to_string(),
            ttl: Some("87600h".to_string()),
            key_type: "rsa".to_string(),
            key_bits: 2048,
            export_private_key: false,
            urls: None,
            crl: None,
            tune: None,
            authentication: auth(),
        },
    );
    resource.status = Some(PKIEngineStatus {
        provisioning_state: state,
        certificate: (state != PkiProvisioningState::Unstarted).then(|| "CERT".to_string()),
        ..Default::default()
    });
    PkiHooks::new(resource)
}

fn ctx<'a>(vault: &'a RecordingVault, reader: &'a MemoryReader) -> ReconcileContext<'a> {
    ReconcileContext {
        vault,
        reader,
        vault_namespace: None,
    }
}

#[tokio::test]
async fn create_or_update_without_drift_performs_zero_writes() {
    let vault = RecordingVault::new();
    let text = "path \"kv/*\" { capabilities = [\"read\"] }";
    vault.seed("sys/policies/acl/reader", json!({ "policy": text }));

    let endpoint = GenericEndpoint::new(&vault);
    let outcome = endpoint.create_or_update(&policy("reader", text)).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Unchanged);
    assert!(vault.write_calls().is_empty(), "no-drift reconcile wrote");
}

#[tokio::test]
async fn create_or_update_writes_on_drift_and_absence() {
    let vault = RecordingVault::new();
    let endpoint = GenericEndpoint::new(&vault);

    let outcome = endpoint
        .create_or_update(&policy("reader", "path \"kv/*\" {}"))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Created);

    let outcome = endpoint
        .create_or_update(&policy("reader", "path \"kv/new/*\" {}"))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Updated);
}

#[tokio::test]
async fn delete_if_exists_tolerates_absence_for_every_endpoint_kind() {
    let vault = RecordingVault::new();

    GenericEndpoint::new(&vault)
        .delete_if_exists(&policy("ghost", "{}"))
        .await
        .unwrap();

    EngineEndpoint::new(&vault)
        .delete_if_exists(&engine("ghost-kv", None))
        .await
        .unwrap();

    AuditEndpoint::new(&vault)
        .delete_if_exists(&audit_device(false))
        .await
        .unwrap();

    PkiEndpoint::new(&vault)
        .delete_if_exists(&pki_root(PkiProvisioningState::Generated))
        .await
        .unwrap();
}

#[tokio::test]
async fn non_404_errors_propagate_unchanged() {
    let vault = RecordingVault::new();
    vault.fail_path("sys/policies/acl/reader", 503);

    let err = GenericEndpoint::new(&vault)
        .create_or_update(&policy("reader", "{}"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        vault_resource_controller::vault::error::VaultError::Api { status: 503, .. }
    ));
}

#[tokio::test]
async fn audit_update_is_exactly_disable_then_enable() {
    let vault = RecordingVault::new();
    vault.seed("sys/audit/file-audit", json!({ "type": "file" }));
    vault.seed(
        "sys/audit",
        json!({
            "file-audit/": {
                "type": "file",
                "description": "",
                "local": false,
                "options": { "file_path": "/vault/audit.log" },
            }
        }),
    );

    let outcome = AuditEndpoint::new(&vault)
        .create_or_update(&audit_device(true))
        .await
        .unwrap();

    assert_eq!(outcome, WriteOutcome::Updated);
    assert_eq!(
        vault.write_calls(),
        vec![
            VaultCall::Delete("sys/audit/file-audit".to_string()),
            VaultCall::Write("sys/audit/file-audit".to_string()),
        ],
        "audit update must be one disable followed by one enable"
    );
}

#[tokio::test]
async fn audit_device_in_sync_is_untouched() {
    let vault = RecordingVault::new();
    vault.seed(
        "sys/audit",
        json!({
            "file-audit/": {
                "type": "file",
                "description": "",
                "local": true,
                "options": { "file_path": "/vault/audit.log" },
            }
        }),
    );

    let outcome = AuditEndpoint::new(&vault)
        .create_or_update(&audit_device(true))
        .await
        .unwrap();

    assert_eq!(outcome, WriteOutcome::Unchanged);
    assert!(vault.write_calls().is_empty());
}

#[tokio::test]
async fn pki_generation_never_reruns_once_generated() {
    let vault = RecordingVault::new();
    vault.seed(
        "sys/mounts",
        json!({ "pki-root/": { "type": "pki", "accessor": "pki_root_acc" } }),
    );

    let mut hooks = pki_root(PkiProvisioningState::Generated);
    PkiEndpoint::new(&vault).reconcile(&mut hooks).await.unwrap();

    let generate_writes: Vec<_> = vault
        .calls()
        .into_iter()
        .filter(|c| matches!(c, VaultCall::Write(p) if p.contains("generate")))
        .collect();
    assert!(
        generate_writes.is_empty(),
        "generated CA must never be regenerated: {generate_writes:?}"
    );
}

#[tokio::test]
async fn pki_root_generation_flow_advances_state_once() {
    let vault = RecordingVault::new();
    vault.respond_to_write(
        "pki-root/root/generate/internal",
        json!({ "certificate": "CERT-PEM" }),
    );

    let mut hooks = pki_root(PkiProvisioningState::Unstarted);
    let outcome = PkiEndpoint::new(&vault).reconcile(&mut hooks).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Created);
    assert_eq!(hooks.provisioning_state(), PkiProvisioningState::Generated);

    let generate_count = vault
        .calls()
        .iter()
        .filter(|c| matches!(c, VaultCall::Write(p) if p.contains("generate")))
        .count();
    assert_eq!(generate_count, 1);
}

#[tokio::test]
async fn engine_mount_then_idempotent_second_reconcile() {
    let vault = RecordingVault::new();

    // First reconcile: no mount exists, so the engine is created and the
    // accessor round-trips from the fresh listing.
    let mut hooks = engine("team-a/kv", Some("1h"));
    let outcome = EngineEndpoint::new(&vault).reconcile(&mut hooks).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Created);
    let accessor = hooks.accessor().expect("accessor populated after mount");
    assert!(!accessor.is_empty());

    // Second reconcile with an identical spec performs no further writes.
    vault.clear_calls();
    let mut hooks = engine("team-a/kv", Some("1h"));
    let outcome = EngineEndpoint::new(&vault).reconcile(&mut hooks).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Unchanged);
    assert!(
        vault.write_calls().is_empty(),
        "second reconcile must not write: {:?}",
        vault.write_calls()
    );
    assert_eq!(hooks.accessor(), Some(accessor));
}

#[tokio::test]
async fn engine_tune_drift_triggers_single_tune_write() {
    let vault = RecordingVault::new();

    let mut hooks = engine("team-a/kv", Some("1h"));
    EngineEndpoint::new(&vault).reconcile(&mut hooks).await.unwrap();
    vault.clear_calls();

    // Desired TTL changed: exactly one tune write, no remount.
    let mut hooks = engine("team-a/kv", Some("2h"));
    let outcome = EngineEndpoint::new(&vault).reconcile(&mut hooks).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Updated);
    assert_eq!(
        vault.write_calls(),
        vec![VaultCall::Write("sys/mounts/team-a/kv/tune".to_string())]
    );
}

#[tokio::test]
async fn policy_prepare_resolves_accessor_placeholders() {
    let vault = RecordingVault::new();
    let reader = MemoryReader::new().with_accessor("team-a", "team-kv", "kv_12345678");

    let mut hooks = PolicyHooks::new({
        let mut resource = VaultPolicy::new(
            "templated",
            VaultPolicySpec {
                name: None,
                policy: "path \"{{accessor:team-kv}}/*\" {}".to_string(),
                accessor_references: vec![vault_resource_controller::crd::AccessorReference {
                    name: "team-kv".to_string(),
                    namespace: Some("team-a".to_string()),
                }],
                authentication: auth(),
            },
        );
        resource.metadata.namespace = Some("team-a".to_string());
        resource
    });

    use vault_resource_controller::vault::contract::VaultResource;
    hooks.prepare(&ctx(&vault, &reader)).await.unwrap();
    let payload = hooks.payload();
    assert_eq!(
        payload.get("policy").and_then(|p| p.as_str()),
        Some("path \"kv_12345678/*\" {}")
    );
}
