//! # Generic Endpoint
//!
//! CRUD against a single Vault path driven by the Resource Contract. This
//! is where the controller's idempotency guarantee lives: a reconcile that
//! observes no drift performs zero backend writes.
//!
//! No retry happens at this layer. Errors other than "not found" propagate
//! unchanged; retrying is the caller's scheduling concern.

use crate::vault::api::{Payload, VaultApi};
use crate::vault::contract::VaultResource;
use crate::vault::error::VaultError;

/// What a `create_or_update` actually did against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

impl WriteOutcome {
    #[must_use]
    pub fn wrote(&self) -> bool {
        !matches!(self, WriteOutcome::Unchanged)
    }
}

/// CRUD over one backend path.
pub struct GenericEndpoint<'a> {
    vault: &'a dyn VaultApi,
}

impl std::fmt::Debug for GenericEndpoint<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericEndpoint").finish_non_exhaustive()
    }
}

impl<'a> GenericEndpoint<'a> {
    #[must_use]
    pub fn new(vault: &'a dyn VaultApi) -> Self {
        Self { vault }
    }

    /// Read the resource's current document, `None` when absent.
    pub async fn read<R: VaultResource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<Option<Payload>, VaultError> {
        self.vault.read(&resource.path()).await
    }

    /// Unconditionally write the desired payload.
    pub async fn create<R: VaultResource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<(), VaultError> {
        self.vault
            .write(&resource.path(), &resource.payload())
            .await
            .map(|_| ())
    }

    /// Write only when the observed document is absent or not equivalent
    /// to the desired payload.
    pub async fn create_or_update<R: VaultResource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<WriteOutcome, VaultError> {
        match self.read(resource).await? {
            None => {
                self.create(resource).await?;
                Ok(WriteOutcome::Created)
            }
            Some(observed) => {
                if resource.is_equivalent(&observed)? {
                    Ok(WriteOutcome::Unchanged)
                } else {
                    self.create(resource).await?;
                    Ok(WriteOutcome::Updated)
                }
            }
        }
    }

    /// Delete the resource's document, treating absence as success.
    pub async fn delete_if_exists<R: VaultResource + ?Sized>(
        &self,
        resource: &R,
    ) -> Result<(), VaultError> {
        match self.vault.delete(&resource.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
