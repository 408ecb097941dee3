//! # Spec Validation
//!
//! Field validation performed before any backend call. A validation error
//! is recorded as a failed condition and is not retried until the spec
//! changes; retrying cannot fix a spec the user has to edit.

use anyhow::Result;
use regex::Regex;

use crate::crd::{TargetNamespaces, VaultAuthentication};
use crate::vault::duration::parse_vault_duration;

/// Validate a Vault mount or document path segment.
///
/// Vault accepts alphanumerics, `/`, `-`, `_` and `.`; leading or
/// trailing slashes and the reserved `sys`/`auth` prefixes are rejected
/// because the controller composes full paths itself.
pub fn validate_mount_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(anyhow::anyhow!("path must not be empty"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(anyhow::anyhow!(
            "path '{path}' must not start or end with '/'"
        ));
    }
    if path == "sys" || path.starts_with("sys/") || path == "auth" || path.starts_with("auth/") {
        return Err(anyhow::anyhow!(
            "path '{path}' collides with a reserved Vault prefix"
        ));
    }
    let path_regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_.-]*$")
        .map_err(|e| anyhow::anyhow!("failed to compile regex: {e}"))?;
    if !path_regex.is_match(path) {
        return Err(anyhow::anyhow!(
            "path '{path}' contains characters Vault does not accept in mount paths"
        ));
    }
    Ok(())
}

/// Validate an optional Vault duration field.
pub fn validate_optional_duration(value: Option<&str>, field_name: &str) -> Result<()> {
    if let Some(raw) = value {
        parse_vault_duration(raw)
            .map_err(|e| anyhow::anyhow!("{field_name} '{raw}' is not a valid duration: {e}"))?;
    }
    Ok(())
}

/// Validate the authentication reference shared by every kind.
pub fn validate_authentication(auth: &VaultAuthentication) -> Result<()> {
    if auth.role.trim().is_empty() {
        return Err(anyhow::anyhow!("authentication.role must not be empty"));
    }
    if auth.path.trim().is_empty() {
        return Err(anyhow::anyhow!("authentication.path must not be empty"));
    }
    Ok(())
}

/// Validate namespace targeting: exactly one of the explicit list or the
/// label selector must be set.
pub fn validate_target_namespaces(target: &TargetNamespaces) -> Result<()> {
    match (&target.target_namespaces, &target.namespace_selector) {
        (Some(_), Some(_)) => Err(anyhow::anyhow!(
            "targetNamespaces and namespaceSelector are mutually exclusive"
        )),
        (None, None) => Err(anyhow::anyhow!(
            "one of targetNamespaces or namespaceSelector is required"
        )),
        (Some(list), None) if list.is_empty() => {
            Err(anyhow::anyhow!("targetNamespaces must not be empty"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::NamespaceSelector;

    fn auth() -> VaultAuthentication {
        VaultAuthentication {
            path: "kubernetes".to_string(),
            role: "controller".to_string(),
            namespace: None,
        }
    }

    #[test]
    fn accepts_nested_mount_paths() {
        assert!(validate_mount_path("team-a/kv").is_ok());
        assert!(validate_mount_path("pki_intermediate.v2").is_ok());
    }

    #[test]
    fn rejects_reserved_and_malformed_paths() {
        assert!(validate_mount_path("").is_err());
        assert!(validate_mount_path("/kv").is_err());
        assert!(validate_mount_path("kv/").is_err());
        assert!(validate_mount_path("sys/mounts").is_err());
        assert!(validate_mount_path("auth/kubernetes").is_err());
        assert!(validate_mount_path("kv with spaces").is_err());
    }

    #[test]
    fn validates_authentication_fields() {
        assert!(validate_authentication(&auth()).is_ok());
        let mut bad = auth();
        bad.role = "  ".to_string();
        assert!(validate_authentication(&bad).is_err());
    }

    #[test]
    fn target_namespaces_requires_exactly_one_source() {
        let both = TargetNamespaces {
            target_namespaces: Some(vec!["a".to_string()]),
            namespace_selector: Some(NamespaceSelector::default()),
        };
        assert!(validate_target_namespaces(&both).is_err());

        let neither = TargetNamespaces::default();
        assert!(validate_target_namespaces(&neither).is_err());

        let list = TargetNamespaces {
            target_namespaces: Some(vec!["a".to_string()]),
            namespace_selector: None,
        };
        assert!(validate_target_namespaces(&list).is_ok());

        let selector = TargetNamespaces {
            target_namespaces: None,
            namespace_selector: Some(NamespaceSelector::default()),
        };
        assert!(validate_target_namespaces(&selector).is_ok());
    }
}
