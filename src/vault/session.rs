//! # Backend Session
//!
//! Obtains a short-lived authenticated Vault client. The login strategy is
//! pluggable; the one we ship exchanges the controller's projected service
//! account JWT for a Vault client token via an auth engine mount
//! (`auth/<mount>/login`).
//!
//! Sessions are established per reconciliation and never cached: a stale
//! token can therefore never outlive the reconcile that obtained it.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::client::HttpVaultClient;
use super::error::VaultError;

/// A Vault client token, wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionToken {
    secret: String,
}

impl SessionToken {
    #[must_use]
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// The raw token for the `X-Vault-Token` header.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Where the login JWT comes from.
#[derive(Debug, Clone)]
pub enum JwtSource {
    /// Read the projected service account token file on every login, so
    /// kubelet rotation is picked up without a restart.
    File(PathBuf),
    /// A fixed token, used by tests and out-of-cluster runs.
    Value(String),
}

impl JwtSource {
    async fn resolve(&self) -> Result<String, VaultError> {
        match self {
            JwtSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|jwt| jwt.trim().to_string())
                .map_err(|e| {
                    VaultError::Auth(format!("cannot read JWT from {}: {e}", path.display()))
                }),
            JwtSource::Value(jwt) => Ok(jwt.clone()),
        }
    }
}

/// Pluggable login strategy producing a session token.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn login(
        &self,
        http: &reqwest::Client,
        address: &str,
        namespace: Option<&str>,
    ) -> Result<SessionToken, VaultError>;
}

/// Kubernetes auth engine login: exchange a service account JWT for a
/// client token against `auth/<mount>/login`.
#[derive(Debug, Clone)]
pub struct KubernetesJwtLogin {
    pub mount: String,
    pub role: String,
    pub jwt: JwtSource,
}

#[async_trait]
impl AuthStrategy for KubernetesJwtLogin {
    async fn login(
        &self,
        http: &reqwest::Client,
        address: &str,
        namespace: Option<&str>,
    ) -> Result<SessionToken, VaultError> {
        let jwt = self.jwt.resolve().await?;
        let url = format!(
            "{}/v1/auth/{}/login",
            address.trim_end_matches('/'),
            self.mount.trim_matches('/')
        );

        let mut builder = http
            .post(url)
            .json(&serde_json::json!({ "role": self.role, "jwt": jwt }));
        if let Some(ns) = namespace {
            builder = builder.header("X-Vault-Namespace", ns);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| VaultError::Auth(format!("login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::Auth(format!(
                "login against auth/{} returned status {status} for role '{}'",
                self.mount, self.role
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VaultError::Auth(format!("login response is not JSON: {e}")))?;

        let token = body
            .get("auth")
            .and_then(|auth| auth.get("client_token"))
            .and_then(Value::as_str)
            .ok_or_else(|| VaultError::Auth("login response carries no client token".into()))?;

        Ok(SessionToken::new(token.to_string()))
    }
}

/// Connection coordinates for one Vault server.
#[derive(Debug, Clone)]
pub struct VaultConnection {
    pub address: String,
    /// Vault enterprise namespace the session is scoped to, if any.
    pub namespace: Option<String>,
}

/// Establish a fresh authenticated session.
pub async fn establish(
    connection: &VaultConnection,
    strategy: &dyn AuthStrategy,
) -> Result<HttpVaultClient, VaultError> {
    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| VaultError::Transport(format!("cannot build HTTP client: {e}")))?;

    let token = strategy
        .login(&http, &connection.address, connection.namespace.as_deref())
        .await?;

    Ok(HttpVaultClient::new(
        http,
        connection.address.clone(),
        connection.namespace.clone(),
        token,
    ))
}
