//! # Vault HTTP Client
//!
//! reqwest-based implementation of [`VaultApi`] against Vault's `/v1` HTTP
//! surface. One client is established per reconciliation via
//! [`super::session::establish`]; no session is ever reused across
//! reconcile attempts, so an expired token can cost at most one attempt.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use super::api::{Payload, VaultApi};
use super::error::VaultError;
use super::session::SessionToken;
use crate::observability::metrics;

/// Authenticated handle to one Vault server (optionally one Vault
/// namespace). All paths are relative to `/v1/`.
pub struct HttpVaultClient {
    http: reqwest::Client,
    address: String,
    namespace: Option<String>,
    token: SessionToken,
}

impl std::fmt::Debug for HttpVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token deliberately omitted.
        f.debug_struct("HttpVaultClient")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl HttpVaultClient {
    pub(crate) fn new(
        http: reqwest::Client,
        address: String,
        namespace: Option<String>,
        token: SessionToken,
    ) -> Self {
        Self {
            http,
            address,
            namespace,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.address.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header("X-Vault-Token", self.token.reveal());
        if let Some(ns) = &self.namespace {
            builder = builder.header("X-Vault-Namespace", ns);
        }
        builder
    }

    /// Send a request and normalize the response body.
    ///
    /// Vault wraps most answers in `{"data": {...}}`; a few system
    /// endpoints return the interesting object at the top level. The
    /// `data` object wins when present.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Payload>,
    ) -> Result<Option<Payload>, VaultError> {
        metrics::increment_vault_requests(method.as_str());

        let mut builder = self.request(method, path);
        if let Some(payload) = body {
            builder = builder.json(payload);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(VaultError::NotFound(path.to_string()));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            let message = read_error_body(response).await;
            return Err(VaultError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VaultError::malformed(path, format!("invalid JSON body: {e}")))?;

        match body {
            Value::Object(mut map) => {
                if let Some(Value::Object(data)) = map.remove("data") {
                    Ok(Some(data))
                } else {
                    Ok(Some(map))
                }
            }
            other => Err(VaultError::malformed(
                path,
                format!("expected a JSON object, got {other}"),
            )),
        }
    }
}

/// Collect Vault's `{"errors": [...]}` body into one message.
async fn read_error_body(response: reqwest::Response) -> String {
    match response.json::<Value>().await {
        Ok(body) => body
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|joined| !joined.is_empty())
            .unwrap_or_else(|| body.to_string()),
        Err(_) => "no error body".to_string(),
    }
}

#[async_trait]
impl VaultApi for HttpVaultClient {
    async fn read(&self, path: &str) -> Result<Option<Payload>, VaultError> {
        match self.dispatch(Method::GET, path, None).await {
            Ok(payload) => Ok(payload),
            // Absence is a legitimate read result.
            Err(VaultError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &str, payload: &Payload) -> Result<Option<Payload>, VaultError> {
        self.dispatch(Method::POST, path, Some(payload)).await
    }

    async fn delete(&self, path: &str) -> Result<(), VaultError> {
        self.dispatch(Method::DELETE, path, None).await.map(|_| ())
    }

    async fn list(&self, path: &str) -> Result<Option<Payload>, VaultError> {
        let url = format!("{}?list=true", self.url(path));
        metrics::increment_vault_requests("LIST");

        let mut builder = self
            .http
            .get(url)
            .header("X-Vault-Token", self.token.reveal());
        if let Some(ns) = &self.namespace {
            builder = builder.header("X-Vault-Namespace", ns);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = read_error_body(response).await;
            return Err(VaultError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VaultError::malformed(path, format!("invalid JSON body: {e}")))?;
        match body.get("data") {
            Some(Value::Object(data)) => Ok(Some(data.clone())),
            _ => Err(VaultError::malformed(path, "list response without data")),
        }
    }
}
