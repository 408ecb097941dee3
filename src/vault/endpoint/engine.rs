//! # Engine Endpoint
//!
//! Specialization for mountable engines (secret engines under
//! `sys/mounts`, auth engines under `sys/auth`).
//!
//! Mounts have no readable "self" document, so existence is decided by
//! listing the parent path and matching this mount's tail segment (Vault
//! suffixes listing keys with a trailing slash). The listing also carries
//! the backend-assigned accessor, which is propagated back onto the
//! resource; it can never be derived locally.
//!
//! Mounting and tuning are always two separate backend calls, and tuning
//! is never attempted on the creation pass: Vault applies the initial tune
//! settings from the mount payload itself.

use crate::vault::api::{Payload, VaultApi};
use crate::vault::contract::VaultResource;
use crate::vault::error::VaultError;

use super::generic::{GenericEndpoint, WriteOutcome};

/// Capabilities of a mountable engine, refining the Resource Contract.
pub trait EngineResource: VaultResource {
    /// Parent listing path: `sys/mounts` or `sys/auth`.
    fn mount_parent(&self) -> String;

    /// Desired tune document for `<path>/tune`.
    fn tune_payload(&self) -> Payload;

    /// Whether the observed tune document matches the desired one.
    fn is_tune_equivalent(&self, observed: &Payload) -> Result<bool, VaultError>;

    /// Accessor last observed on the backend, if any.
    fn accessor(&self) -> Option<String>;

    /// Store the backend-assigned accessor round-tripped from a listing.
    fn set_accessor(&mut self, accessor: String);
}

/// Endpoint for engine mounts, composed from the generic endpoint.
pub struct EngineEndpoint<'a> {
    vault: &'a dyn VaultApi,
    generic: GenericEndpoint<'a>,
}

impl std::fmt::Debug for EngineEndpoint<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEndpoint").finish_non_exhaustive()
    }
}

impl<'a> EngineEndpoint<'a> {
    #[must_use]
    pub fn new(vault: &'a dyn VaultApi) -> Self {
        Self {
            vault,
            generic: GenericEndpoint::new(vault),
        }
    }

    /// The mount's key inside its parent listing (`"team/kv"` for a path
    /// of `"sys/mounts/team/kv"`), with Vault's trailing slash.
    fn listing_key<R: EngineResource + ?Sized>(resource: &R) -> String {
        let path = resource.path();
        let parent = resource.mount_parent();
        let tail = path
            .strip_prefix(&format!("{parent}/"))
            .unwrap_or(path.as_str())
            .trim_matches('/');
        format!("{tail}/")
    }

    /// Whether the mount exists, decided by the parent listing. On a hit
    /// the backend accessor is extracted and stored on the resource.
    pub async fn exists<R: EngineResource + ?Sized>(
        &self,
        resource: &mut R,
    ) -> Result<bool, VaultError> {
        let parent = resource.mount_parent();
        let Some(listing) = self.vault.read(&parent).await? else {
            return Ok(false);
        };

        let key = Self::listing_key(resource);
        match listing.get(&key) {
            Some(entry) => {
                if let Some(accessor) = entry.get("accessor").and_then(|a| a.as_str()) {
                    resource.set_accessor(accessor.to_string());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mount the engine. The mount response has no body; the accessor is
    /// picked up by a follow-up listing read.
    pub async fn create<R: EngineResource + ?Sized>(
        &self,
        resource: &mut R,
    ) -> Result<(), VaultError> {
        self.generic.create(resource).await?;
        // Round-trip the accessor from a fresh listing.
        self.exists(resource).await?;
        Ok(())
    }

    /// Reconcile the tune document at `<path>/tune`, writing only on drift.
    pub async fn create_or_update_tune_config<R: EngineResource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<WriteOutcome, VaultError> {
        let tune_path = format!("{}/tune", resource.path());
        let desired = resource.tune_payload();
        if desired.is_empty() {
            return Ok(WriteOutcome::Unchanged);
        }

        let write_needed = match self.vault.read(&tune_path).await? {
            Some(observed) => !resource.is_tune_equivalent(&observed)?,
            None => true,
        };

        if write_needed {
            self.vault.write(&tune_path, &desired).await?;
            Ok(WriteOutcome::Updated)
        } else {
            Ok(WriteOutcome::Unchanged)
        }
    }

    /// Full engine reconcile: mount when absent, otherwise converge the
    /// tune document. Never both in the same pass.
    pub async fn reconcile<R: EngineResource + ?Sized>(
        &self,
        resource: &mut R,
    ) -> Result<WriteOutcome, VaultError> {
        if self.exists(resource).await? {
            self.create_or_update_tune_config(resource).await
        } else {
            self.create(resource).await?;
            Ok(WriteOutcome::Created)
        }
    }

    /// Unmount, tolerating an already-absent mount.
    pub async fn delete_if_exists<R: EngineResource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<(), VaultError> {
        self.generic.delete_if_exists(resource).await
    }
}
