//! Test fixtures for TidbCluster resources and member pods
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let cluster = create_test_cluster("demo", "ns");
//! let pod = PodBuilder::member("demo-pd-0", "ns", "demo", "pd")
//!     .pending()
//!     .with_claim("pd-demo-pd-0")
//!     .build();
//!
//! let kube = FakeKube::new();
//! kube.add_pod(pod);
//! let cleaner = kube.cleaner();
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodStatus, Volume,
};
use kube::ResourceExt;
use kube::core::ObjectMeta;
use tidb_operator::controller::{
    DefaultOrphanPodsCleaner, Error, KubeReader, PodControl, PodLister, PvcLister, Result,
};
use tidb_operator::crd::{StorageMemberSpec, TidbCluster, TidbClusterSpec};
use tidb_operator::label::{INSTANCE_LABEL_KEY, LabelSelector, member_labels};

// =============================================================================
// TidbCluster fixtures
// =============================================================================

/// Create a TidbCluster labeled with its own name as instance
pub fn create_test_cluster(name: &str, namespace: &str) -> TidbCluster {
    let mut cluster = TidbCluster::new(
        name,
        TidbClusterSpec {
            pd: StorageMemberSpec {
                replicas: 3,
                storage_size: "1Gi".to_string(),
                storage_class_name: Some("standard".to_string()),
            },
            tikv: StorageMemberSpec {
                replicas: 3,
                storage_size: "10Gi".to_string(),
                storage_class_name: Some("standard".to_string()),
            },
            tidb: None,
        },
    );
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster.metadata.uid = Some("test-uid-12345".to_string());
    cluster.metadata.labels = Some(BTreeMap::from([(
        INSTANCE_LABEL_KEY.to_string(),
        name.to_string(),
    )]));
    cluster
}

// =============================================================================
// Pod builder
// =============================================================================

/// Builder for member pods
pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    /// A Running pod of `component` belonging to cluster `instance`
    pub fn member(name: &str, namespace: &str, instance: &str, component: &str) -> Self {
        Self {
            pod: Pod {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    labels: Some(member_labels(instance, component)),
                    uid: Some(format!("{}-uid-1", name)),
                    resource_version: Some("1".to_string()),
                    ..Default::default()
                },
                spec: Some(PodSpec::default()),
                status: Some(PodStatus {
                    phase: Some("Running".to_string()),
                    ..Default::default()
                }),
            },
        }
    }

    pub fn pending(self) -> Self {
        self.with_phase("Pending")
    }

    pub fn with_phase(mut self, phase: &str) -> Self {
        self.pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_claim(mut self, claim_name: &str) -> Self {
        let spec = self.pod.spec.get_or_insert_with(PodSpec::default);
        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: format!("data-{}", claim_name),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.to_string(),
                read_only: None,
            }),
            ..Default::default()
        });
        self
    }

    pub fn with_identity(mut self, uid: &str, resource_version: &str) -> Self {
        self.pod.metadata.uid = Some(uid.to_string());
        self.pod.metadata.resource_version = Some(resource_version.to_string());
        self
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}

pub fn create_test_pvc(name: &str, namespace: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

// =============================================================================
// In-memory Kubernetes fake
// =============================================================================

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[derive(Default)]
struct FakeState {
    /// Objects as seen by the watch cache
    cached_pods: BTreeMap<String, Pod>,
    cached_pvcs: BTreeMap<String, PersistentVolumeClaim>,
    /// Objects as stored in the API server
    api_pods: BTreeMap<String, Pod>,
    api_pvcs: BTreeMap<String, PersistentVolumeClaim>,
    /// Names of deleted pods, in deletion order
    deleted: Vec<String>,
    fail_list: bool,
    fail_api_pod_get: bool,
}

/// In-memory cache and API server
///
/// Implements the lister, reader and pod control traits. Writes go to both
/// views unless a test deliberately makes them diverge to simulate cache lag.
#[derive(Clone, Default)]
pub struct FakeKube {
    state: Arc<Mutex<FakeState>>,
}

impl FakeKube {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pod to both the cache and the API server
    pub fn add_pod(&self, pod: Pod) {
        let mut state = self.state.lock().unwrap();
        let k = key(&pod.namespace().unwrap(), &pod.name_any());
        state.cached_pods.insert(k.clone(), pod.clone());
        state.api_pods.insert(k, pod);
    }

    /// Replace the API server copy of a pod, leaving the cache stale
    pub fn set_api_pod(&self, pod: Pod) {
        let mut state = self.state.lock().unwrap();
        let k = key(&pod.namespace().unwrap(), &pod.name_any());
        state.api_pods.insert(k, pod);
    }

    pub fn add_pvc(&self, pvc: PersistentVolumeClaim) {
        let mut state = self.state.lock().unwrap();
        let k = key(&pvc.namespace().unwrap(), &pvc.name_any());
        state.cached_pvcs.insert(k.clone(), pvc.clone());
        state.api_pvcs.insert(k, pvc);
    }

    /// Add a claim the watch cache has not seen yet
    pub fn add_api_only_pvc(&self, pvc: PersistentVolumeClaim) {
        let mut state = self.state.lock().unwrap();
        let k = key(&pvc.namespace().unwrap(), &pvc.name_any());
        state.api_pvcs.insert(k, pvc);
    }

    /// Remove a pod from the API server only, as if the cache had not caught up
    pub fn remove_api_pod(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.api_pods.remove(&key(namespace, name));
    }

    /// Make the next cache listings fail
    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    /// Make authoritative pod reads fail
    pub fn fail_api_pod_get(&self) {
        self.state.lock().unwrap().fail_api_pod_get = true;
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Build a cleaner wired entirely to this fake
    pub fn cleaner(&self) -> DefaultOrphanPodsCleaner {
        DefaultOrphanPodsCleaner::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }
}

fn server_error(message: &str) -> Error {
    Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

#[async_trait]
impl PodLister for FakeKube {
    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Pod>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(Error::CacheNotReady("pods".to_string()));
        }
        Ok(state
            .cached_pods
            .values()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| selector.matches(pod.labels()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PvcLister for FakeKube {
    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        let state = self.state.lock().unwrap();
        Ok(state.cached_pvcs.get(&key(namespace, name)).cloned())
    }
}

#[async_trait]
impl KubeReader for FakeKube {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let state = self.state.lock().unwrap();
        if state.fail_api_pod_get {
            return Err(server_error("etcdserver: request timed out"));
        }
        Ok(state.api_pods.get(&key(namespace, name)).cloned())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        let state = self.state.lock().unwrap();
        Ok(state.api_pvcs.get(&key(namespace, name)).cloned())
    }
}

#[async_trait]
impl PodControl for FakeKube {
    async fn delete_pod(&self, _cluster: &TidbCluster, pod: &Pod) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let k = key(&pod.namespace().unwrap(), &pod.name_any());
        state.cached_pods.remove(&k);
        state.api_pods.remove(&k);
        state.deleted.push(pod.name_any());
        Ok(())
    }
}
