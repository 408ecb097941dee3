//! Shared test harness: a recording in-memory Vault, an in-memory control
//! plane, and a map-backed collaborator reader.
//!
//! The mock Vault emulates the two backend behaviors the endpoints lean
//! on: mounting an engine updates the parent listing (with a fresh
//! accessor and a readable tune document), and enabling an audit device
//! updates the `sys/audit` listing.

#![allow(dead_code, reason = "each test binary uses a subset of the harness")]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use vault_resource_controller::crd::NamespaceSelector;
use vault_resource_controller::vault::api::{Payload, VaultApi};
use vault_resource_controller::vault::contract::CollaboratorReader;
use vault_resource_controller::vault::error::VaultError;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultCall {
    Read(String),
    Write(String),
    Delete(String),
    List(String),
}

impl VaultCall {
    pub fn is_write(&self) -> bool {
        matches!(self, VaultCall::Write(_) | VaultCall::Delete(_))
    }
}

/// In-memory Vault recording every call.
#[derive(Default)]
pub struct RecordingVault {
    store: Mutex<HashMap<String, Payload>>,
    calls: Mutex<Vec<VaultCall>>,
    write_responses: Mutex<HashMap<String, Payload>>,
    fail_paths: Mutex<HashMap<String, u16>>,
}

impl RecordingVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document at a path.
    pub fn seed(&self, path: &str, value: Value) {
        self.store
            .lock()
            .unwrap()
            .insert(path.to_string(), as_payload(value));
    }

    /// Configure the body returned by a write to `path` (PKI generation,
    /// password policy responses).
    pub fn respond_to_write(&self, path: &str, value: Value) {
        self.write_responses
            .lock()
            .unwrap()
            .insert(path.to_string(), as_payload(value));
    }

    /// Make every call against `path` fail with the given HTTP status.
    pub fn fail_path(&self, path: &str, status: u16) {
        self.fail_paths
            .lock()
            .unwrap()
            .insert(path.to_string(), status);
    }

    pub fn calls(&self) -> Vec<VaultCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> Vec<VaultCall> {
        self.calls().into_iter().filter(VaultCall::is_write).collect()
    }

    pub fn document(&self, path: &str) -> Option<Payload> {
        self.store.lock().unwrap().get(path).cloned()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Remove a document without recording a call (out-of-band deletion).
    pub fn remove_out_of_band(&self, path: &str) {
        self.store.lock().unwrap().remove(path);
    }

    fn record(&self, call: VaultCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, path: &str) -> Result<(), VaultError> {
        if let Some(status) = self.fail_paths.lock().unwrap().get(path) {
            return Err(VaultError::Api {
                path: path.to_string(),
                status: *status,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Emulate listing maintenance for engine mounts and audit devices.
    fn apply_write_side_effects(&self, path: &str, payload: &Payload) {
        let mut store = self.store.lock().unwrap();

        for parent in ["sys/mounts", "sys/auth"] {
            let prefix = format!("{parent}/");
            if let Some(tail) = path.strip_prefix(&prefix) {
                if tail.ends_with("/tune") || tail.is_empty() {
                    continue;
                }
                let engine_type = payload
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("kv");
                let accessor = format!("{engine_type}_{}", tail.replace('/', "_"));
                let entry = json!({ "type": engine_type, "accessor": accessor });
                store
                    .entry(parent.to_string())
                    .or_default()
                    .insert(format!("{tail}/"), entry);

                // A mounted engine always has a readable tune document,
                // seeded from the mount payload's config.
                let tune = payload
                    .get("config")
                    .and_then(|c| c.as_object())
                    .cloned()
                    .unwrap_or_default();
                store.insert(format!("{path}/tune"), tune);
            }
        }

        if let Some(name) = path.strip_prefix("sys/audit/") {
            let entry = Value::Object(payload.clone());
            store
                .entry("sys/audit".to_string())
                .or_default()
                .insert(format!("{name}/"), entry);
        }
    }

    fn remove_listing_entries(&self, path: &str) {
        let mut store = self.store.lock().unwrap();
        for parent in ["sys/mounts", "sys/auth", "sys/audit"] {
            let prefix = format!("{parent}/");
            if let Some(tail) = path.strip_prefix(&prefix) {
                if let Some(listing) = store.get_mut(parent) {
                    listing.remove(&format!("{tail}/"));
                }
                store.remove(&format!("{path}/tune"));
            }
        }
    }
}

fn as_payload(value: Value) -> Payload {
    value
        .as_object()
        .cloned()
        .expect("test payloads are JSON objects")
}

#[async_trait]
impl VaultApi for RecordingVault {
    async fn read(&self, path: &str) -> Result<Option<Payload>, VaultError> {
        self.record(VaultCall::Read(path.to_string()));
        self.check_failure(path)?;
        Ok(self.store.lock().unwrap().get(path).cloned())
    }

    async fn write(&self, path: &str, payload: &Payload) -> Result<Option<Payload>, VaultError> {
        self.record(VaultCall::Write(path.to_string()));
        self.check_failure(path)?;
        self.store
            .lock()
            .unwrap()
            .insert(path.to_string(), payload.clone());
        self.apply_write_side_effects(path, payload);
        Ok(self.write_responses.lock().unwrap().get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), VaultError> {
        self.record(VaultCall::Delete(path.to_string()));
        self.check_failure(path)?;
        let removed = self.store.lock().unwrap().remove(path);
        if removed.is_none() {
            return Err(VaultError::NotFound(path.to_string()));
        }
        self.remove_listing_entries(path);
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Option<Payload>, VaultError> {
        self.record(VaultCall::List(path.to_string()));
        self.check_failure(path)?;
        Ok(self.store.lock().unwrap().get(path).cloned())
    }
}

/// In-memory control plane recording finalizer and status operations in
/// order, so ordering invariants are assertable.
#[derive(Default)]
pub struct MemoryControlPlane {
    pub finalizers: Mutex<Vec<String>>,
    pub status_patches: Mutex<Vec<Value>>,
    pub ops: Mutex<Vec<String>>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers
            .lock()
            .unwrap()
            .iter()
            .any(|f| f == finalizer)
    }

    pub fn last_status(&self) -> Option<Value> {
        self.status_patches.lock().unwrap().last().cloned()
    }

    pub fn operations(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl vault_resource_controller::controller::lifecycle::ControlPlane for MemoryControlPlane {
    async fn ensure_finalizer(&self, finalizer: &str) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push("ensure_finalizer".to_string());
        let mut finalizers = self.finalizers.lock().unwrap();
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, finalizer: &str) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push("remove_finalizer".to_string());
        self.finalizers.lock().unwrap().retain(|f| f != finalizer);
        Ok(())
    }

    async fn patch_status(&self, status: Value) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push("patch_status".to_string());
        self.status_patches.lock().unwrap().push(status);
        Ok(())
    }
}

/// Map-backed collaborator reader.
#[derive(Default)]
pub struct MemoryReader {
    /// (namespace, name, key) -> value
    pub secrets: HashMap<(String, String, String), String>,
    /// (namespace, name) -> accessor
    pub accessors: HashMap<(String, String), String>,
    /// Namespaces returned for every selector
    pub namespaces: Vec<String>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accessor(mut self, namespace: &str, name: &str, accessor: &str) -> Self {
        self.accessors
            .insert((namespace.to_string(), name.to_string()), accessor.to_string());
        self
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, key: &str, value: &str) -> Self {
        self.secrets.insert(
            (namespace.to_string(), name.to_string(), key.to_string()),
            value.to_string(),
        );
        self
    }

    pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.namespaces = namespaces.iter().map(ToString::to_string).collect();
        self
    }
}

#[async_trait]
impl CollaboratorReader for MemoryReader {
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> anyhow::Result<Option<String>> {
        Ok(self
            .secrets
            .get(&(namespace.to_string(), name.to_string(), key.to_string()))
            .cloned())
    }

    async fn engine_accessor(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<String>> {
        Ok(self
            .accessors
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn namespaces_matching(
        &self,
        _selector: &NamespaceSelector,
    ) -> anyhow::Result<Vec<String>> {
        Ok(self.namespaces.clone())
    }
}
