//! Direct reads against the API server, bypassing the watch cache

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::controller::error::Result;

/// Authoritative reads of pods and claims
///
/// Absent objects are reported as `Ok(None)`. Any other failure is an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeReader: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>>;
}

/// [`KubeReader`] backed by the kube client
#[derive(Clone)]
pub struct ApiKubeReader {
    client: Client,
}

impl ApiKubeReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeReader for ApiKubeReader {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
