//! # Vault Error Taxonomy
//!
//! Typed errors for the Vault HTTP API layer. The distinction that matters
//! to callers is "absent" versus "broken": `NotFound` is a legitimate
//! answer for reads and a success for deletes, while everything else must
//! propagate unchanged so the caller's requeue policy can retry it.

use thiserror::Error;

/// Errors returned by the Vault backend layer.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The path does not exist. Not an error for delete/disable operations.
    #[error("vault path '{0}' not found")]
    NotFound(String),

    /// Vault answered with a non-success status other than 404.
    #[error("vault returned status {status} for '{path}': {message}")]
    Api {
        path: String,
        status: u16,
        message: String,
    },

    /// The request never produced a Vault response (connect, DNS, timeout).
    #[error("vault transport failure: {0}")]
    Transport(String),

    /// The login exchange failed. Fatal for the current reconcile; the next
    /// attempt establishes a fresh session.
    #[error("vault login failed: {0}")]
    Auth(String),

    /// Vault answered 2xx but the body does not have the expected shape.
    /// Surfaced as a reconcile failure, never guessed around.
    #[error("malformed vault response from '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

impl VaultError {
    /// True when the error is the 404-equivalent "absent" answer.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }

    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        VaultError::Malformed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        VaultError::Transport(err.to_string())
    }
}
