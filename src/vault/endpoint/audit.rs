//! # Audit Endpoint
//!
//! Specialization for audit devices under `sys/audit`.
//!
//! Audit devices cannot be tuned in place: a drifted device is disabled
//! and re-enabled with the desired options. Existence is decided from the
//! `sys/audit` listing, whose keys always carry a trailing separator.

use crate::vault::api::{Payload, VaultApi};
use crate::vault::contract::VaultResource;
use crate::vault::error::VaultError;

use super::generic::WriteOutcome;

/// Capabilities of an audit device, refining the Resource Contract.
pub trait AuditResource: VaultResource {
    /// Device name as it appears in the `sys/audit` listing (no slash).
    fn device_name(&self) -> String;

    /// Payload for the enable call: type, description, local flag, options.
    fn enable_payload(&self) -> Payload;

    /// Whether an observed listing entry matches the desired device.
    fn is_device_equivalent(&self, observed: &Payload) -> Result<bool, VaultError>;
}

/// Endpoint for audit devices.
pub struct AuditEndpoint<'a> {
    vault: &'a dyn VaultApi,
}

impl std::fmt::Debug for AuditEndpoint<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEndpoint").finish_non_exhaustive()
    }
}

impl<'a> AuditEndpoint<'a> {
    #[must_use]
    pub fn new(vault: &'a dyn VaultApi) -> Self {
        Self { vault }
    }

    /// The observed listing entry for this device, `None` when absent.
    pub async fn observed_device(
        &self,
        resource: &dyn AuditResource,
    ) -> Result<Option<Payload>, VaultError> {
        let Some(listing) = self.vault.read("sys/audit").await? else {
            return Ok(None);
        };
        // Vault suffixes audit device names with a trailing separator.
        let key = format!("{}/", resource.device_name());
        match listing.get(&key) {
            Some(serde_json::Value::Object(entry)) => Ok(Some(entry.clone())),
            Some(other) => Err(VaultError::malformed(
                "sys/audit",
                format!("listing entry for '{key}' is not an object: {other}"),
            )),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, resource: &dyn AuditResource) -> Result<bool, VaultError> {
        Ok(self.observed_device(resource).await?.is_some())
    }

    /// Enable the device with the desired options.
    pub async fn enable(&self, resource: &dyn AuditResource) -> Result<(), VaultError> {
        self.vault
            .write(&resource.path(), &resource.enable_payload())
            .await
            .map(|_| ())
    }

    /// Disable the device, tolerating an already-absent device.
    pub async fn disable(&self, resource: &dyn AuditResource) -> Result<(), VaultError> {
        match self.vault.delete(&resource.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Converge the device: enable when absent; disable-then-enable when
    /// present with drifted options. There is no in-place update call.
    pub async fn create_or_update(
        &self,
        resource: &dyn AuditResource,
    ) -> Result<WriteOutcome, VaultError> {
        match self.observed_device(resource).await? {
            None => {
                self.enable(resource).await?;
                Ok(WriteOutcome::Created)
            }
            Some(observed) => {
                if resource.is_device_equivalent(&observed)? {
                    Ok(WriteOutcome::Unchanged)
                } else {
                    self.disable(resource).await?;
                    self.enable(resource).await?;
                    Ok(WriteOutcome::Updated)
                }
            }
        }
    }

    /// Delete semantics for audit devices are a disable.
    pub async fn delete_if_exists(&self, resource: &dyn AuditResource) -> Result<(), VaultError> {
        self.disable(resource).await
    }
}
