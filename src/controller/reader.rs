//! # Collaborator Reader
//!
//! Kubernetes-backed implementation of the control-plane read seam used by
//! `prepare` hooks: credential secrets, engine accessors, and namespace
//! fan-out by label selector.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};

use crate::crd::{NamespaceSelector, SecretsEngine};
use crate::vault::contract::CollaboratorReader;

/// Reads collaborator objects through the Kubernetes API.
#[derive(Clone)]
pub struct KubeCollaboratorReader {
    client: Client,
}

impl std::fmt::Debug for KubeCollaboratorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCollaboratorReader").finish_non_exhaustive()
    }
}

impl KubeCollaboratorReader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CollaboratorReader for KubeCollaboratorReader {
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> anyhow::Result<Option<String>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = match secrets.get_opt(name).await? {
            Some(secret) => secret,
            None => return Ok(None),
        };
        let Some(data) = secret.data else {
            return Ok(None);
        };
        match data.get(key) {
            Some(bytes) => {
                let value = String::from_utf8(bytes.0.clone()).map_err(|_| {
                    anyhow::anyhow!("secret {namespace}/{name} key '{key}' is not valid UTF-8")
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn engine_accessor(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<String>> {
        let engines: Api<SecretsEngine> = Api::namespaced(self.client.clone(), namespace);
        let engine = match engines.get_opt(name).await? {
            Some(engine) => engine,
            None => return Ok(None),
        };
        Ok(engine.status.and_then(|s| s.accessor))
    }

    async fn namespaces_matching(
        &self,
        selector: &NamespaceSelector,
    ) -> anyhow::Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&selector.to_query()?);
        let list = namespaces.list(&params).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }
}
