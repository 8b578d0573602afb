//! Cache-backed readers for pods and persistent volume claims
//!
//! Reads are served from `reflector` stores kept up to date by watches. The
//! stores are eventually consistent and may lag the API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use kube::runtime::reflector::{ObjectRef, Store};

#[cfg(test)]
use mockall::automock;

use crate::controller::error::Result;
use crate::label::LabelSelector;

/// Lists pods from the watch cache
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodLister: Send + Sync {
    /// List pods in `namespace` whose labels satisfy `selector`
    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Pod>>;
}

/// Reads persistent volume claims from the watch cache
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PvcLister: Send + Sync {
    /// Get a claim by name, `None` if the cache does not hold it
    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>>;
}

/// [`PodLister`] over a reflector store
#[derive(Clone)]
pub struct StorePodLister {
    store: Store<Pod>,
}

impl StorePodLister {
    pub fn new(store: Store<Pod>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PodLister for StorePodLister {
    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Pod>> {
        Ok(self
            .store
            .state()
            .into_iter()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| selector.matches(pod.labels()))
            .map(|pod| pod.as_ref().clone())
            .collect())
    }
}

/// [`PvcLister`] over a reflector store
#[derive(Clone)]
pub struct StorePvcLister {
    store: Store<PersistentVolumeClaim>,
}

impl StorePvcLister {
    pub fn new(store: Store<PersistentVolumeClaim>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PvcLister for StorePvcLister {
    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        let key = ObjectRef::new(name).within(namespace);
        Ok(self.store.get(&key).map(|pvc| pvc.as_ref().clone()))
    }
}
