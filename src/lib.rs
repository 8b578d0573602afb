pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod label;

pub use config::OperatorConfig;
pub use controller::{
    Context, DefaultOrphanPodsCleaner, Error, NoopOrphanPodsCleaner, OrphanPodsCleaner, Result,
    SkipReason, SkipReasons, error_policy, reconcile,
};
pub use crd::TidbCluster;
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use controller::{
    ApiKubeReader, RealPodControl, StorePodLister, StorePvcLister, cluster_ref_for_pod,
};

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Start the pod and PVC reflectors and build the orphan pod cleaner on top of them
///
/// Waits until both caches have completed their initial list.
async fn start_orphan_pods_cleaner(
    client: Client,
    namespace: Option<&str>,
    health_state: Option<Arc<HealthState>>,
) -> Result<DefaultOrphanPodsCleaner> {
    let pods: Api<Pod> = scoped_api(client.clone(), namespace);
    let pvcs: Api<PersistentVolumeClaim> = scoped_api(client.clone(), namespace);

    let (pod_store, pod_writer) = reflector::store::<Pod>();
    let pod_watch = WatcherConfig::default().labels(&label::managed_selector());
    tokio::spawn(
        reflector(pod_writer, watcher(pods, pod_watch))
            .default_backoff()
            .applied_objects()
            .for_each(|_| futures::future::ready(())),
    );

    let (pvc_store, pvc_writer) = reflector::store::<PersistentVolumeClaim>();
    tokio::spawn(
        reflector(pvc_writer, watcher(pvcs, WatcherConfig::default()))
            .default_backoff()
            .applied_objects()
            .for_each(|_| futures::future::ready(())),
    );

    tracing::info!("Waiting for pod and PVC caches to sync");
    pod_store
        .wait_until_ready()
        .await
        .map_err(|e| Error::CacheNotReady(format!("pod cache: {}", e)))?;
    pvc_store
        .wait_until_ready()
        .await
        .map_err(|e| Error::CacheNotReady(format!("PVC cache: {}", e)))?;
    tracing::info!("Pod and PVC caches synced");

    Ok(DefaultOrphanPodsCleaner::new(
        Arc::new(StorePodLister::new(pod_store)),
        Arc::new(StorePvcLister::new(pvc_store)),
        Arc::new(ApiKubeReader::new(client.clone())),
        Arc::new(RealPodControl::new(client, health_state)),
    ))
}

/// Run the TidbCluster controller
///
/// Watches TidbCluster resources and their member pods, running one orphan
/// pod cleanup pass per reconciliation. Only returns if the caches cannot be
/// started or the controller stream ends.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) -> Result<()> {
    let namespace = config.watch_namespace.as_deref();
    tracing::info!(
        "Starting controller for TidbCluster resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let cleaner: Arc<dyn OrphanPodsCleaner> = if config.orphan_pod_cleanup {
        Arc::new(start_orphan_pods_cleaner(client.clone(), namespace, health_state.clone()).await?)
    } else {
        tracing::info!("Orphan pod cleanup disabled");
        Arc::new(NoopOrphanPodsCleaner)
    };

    // Mark as ready once the caches are synced
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(
        client.clone(),
        cleaner,
        health_state,
        config.reconcile_interval,
    ));

    let clusters: Api<TidbCluster> = scoped_api(client.clone(), namespace);
    let pods: Api<Pod> = scoped_api(client, namespace);

    let watcher_config = WatcherConfig::default().any_semantic();
    let pod_watch = watcher_config.clone().labels(&label::managed_selector());

    // Pod events (e.g. a member going Pending) trigger its cluster's reconciliation
    Controller::new(clusters, watcher_config)
        .watches(pods, pod_watch, |pod| cluster_ref_for_pod(&pod))
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // The cluster may be gone by the time a pod event is handled
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::error!("Controller stream ended unexpectedly");
    Ok(())
}
