//! Pod deletion for TidbCluster members

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, Preconditions};
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::controller::error::{Error, Result};
use crate::crd::TidbCluster;
use crate::health::HealthState;

/// Deletes member pods on behalf of a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodControl: Send + Sync {
    /// Delete `pod`, which belongs to `cluster`
    async fn delete_pod(&self, cluster: &TidbCluster, pod: &Pod) -> Result<()>;
}

/// Delete parameters pinned to the pod's uid and resourceVersion
///
/// The API server rejects the delete with 409 Conflict if the object was
/// replaced or modified since `pod` was read.
pub fn delete_params(pod: &Pod) -> DeleteParams {
    DeleteParams {
        preconditions: Some(Preconditions {
            uid: pod.metadata.uid.clone(),
            resource_version: pod.metadata.resource_version.clone(),
        }),
        ..DeleteParams::default()
    }
}

/// [`PodControl`] that deletes through the API server
#[derive(Clone)]
pub struct RealPodControl {
    client: Client,
    health_state: Option<Arc<HealthState>>,
}

impl RealPodControl {
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            health_state,
        }
    }
}

#[async_trait]
impl PodControl for RealPodControl {
    async fn delete_pod(&self, cluster: &TidbCluster, pod: &Pod) -> Result<()> {
        let ns = pod
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let pod_name = pod.name_any();
        let cluster_name = cluster.name_any();

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &ns);
        match api.delete(&pod_name, &delete_params(pod)).await {
            Ok(_) => {
                info!(
                    "Deleted pod {}/{} of TidbCluster {}",
                    ns, pod_name, cluster_name
                );
                if let Some(ref state) = self.health_state {
                    state.metrics.record_orphan_deleted(&ns, &cluster_name);
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Failed to delete pod {}/{} of TidbCluster {}: {}",
                    ns, pod_name, cluster_name, e
                );
                Err(Error::PodDeletion {
                    namespace: ns,
                    pod: pod_name,
                    source: e,
                })
            }
        }
    }
}
