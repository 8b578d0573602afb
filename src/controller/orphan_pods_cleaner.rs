//! Cleanup of orphan PD and TiKV pods
//!
//! When a member's PVC is deleted to force re-provisioning (scale in/out,
//! failover), the claim can linger behind finalizers such as
//! `kubernetes.io/pvc-protection`. If the StatefulSet controller recreates the
//! pod before it sees the claim disappear, it never creates a new claim and the
//! pod stays Pending forever. Deleting such a pod lets the StatefulSet
//! controller create both the pod and its claim again.
//!
//! A pod is only deleted after:
//! 1. the watch cache and the API server both report its claim as absent, and
//! 2. a fresh read of the pod from the API server returns the same uid and
//!    resourceVersion as the cached copy the decision was made on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::controller::error::{Error, Result};
use crate::controller::kube_reader::KubeReader;
use crate::controller::listers::{PodLister, PvcLister};
use crate::controller::pod_control::PodControl;
use crate::crd::TidbCluster;
use crate::label::{self, role_of};

/// Pod phase of a pod that has not been scheduled or started
const POD_PENDING: &str = "Pending";

/// Why a pod examined in a cleanup pass was left alone
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// The pod is neither a PD nor a TiKV member
    NotEligibleMember,
    PodNotPending,
    /// The pod declares no persistent volume claim
    ClaimNameEmpty,
    /// The claim exists in the cache or the API server
    ClaimExists,
    /// The pod was gone by the time it was re-read from the API server
    PodNotFound,
    /// uid or resourceVersion differ between the cached and the fresh pod
    PodChanged,
}

impl SkipReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotEligibleMember => "not an eligible member role",
            SkipReason::PodNotPending => "pod is not pending",
            SkipReason::ClaimNameEmpty => "no claim name found",
            SkipReason::ClaimExists => "claim exists",
            SkipReason::PodNotFound => "pod no longer exists",
            SkipReason::PodChanged => "pod changed before deletion",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pod name to skip reason for one cleanup pass
pub type SkipReasons = BTreeMap<String, SkipReason>;

/// A cleanup pass that was aborted
///
/// Carries the skip reasons recorded before the failure.
#[derive(Error, Debug)]
#[error("orphan pod cleanup aborted after {} skipped pod(s): {source}", .skipped.len())]
pub struct CleanError {
    pub skipped: SkipReasons,
    #[source]
    pub source: Error,
}

impl CleanError {
    pub fn new(skipped: SkipReasons, source: Error) -> Self {
        Self { skipped, source }
    }

    pub fn into_source(self) -> Error {
        self.source
    }
}

/// Identity of a pod object for optimistic concurrency
///
/// Two reads of the same logical object compare equal only if neither a
/// delete/recreate (new uid) nor an update (new resourceVersion) happened
/// between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodIdentity {
    uid: Option<String>,
    resource_version: Option<String>,
}

impl PodIdentity {
    pub fn new(uid: Option<String>, resource_version: Option<String>) -> Self {
        Self {
            uid,
            resource_version,
        }
    }

    pub fn of(pod: &Pod) -> Self {
        Self::new(
            pod.metadata.uid.clone(),
            pod.metadata.resource_version.clone(),
        )
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }
}

/// Result of the two-source claim existence check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimPresence {
    Present,
    /// Absent from both the cache and the API server
    ConfirmedAbsent,
}

/// Whether the pod is waiting to be scheduled
pub fn is_pending(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(POD_PENDING)
}

/// Claim name of the first PVC-backed volume of the pod
///
/// Only the first claim is considered. PD and TiKV members mount exactly one.
pub fn first_claim_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()?
        .volumes
        .as_ref()?
        .iter()
        .find_map(|vol| vol.persistent_volume_claim.as_ref())
        .map(|source| source.claim_name.as_str())
        .filter(|name| !name.is_empty())
}

/// Finds and deletes orphan member pods of a TidbCluster
#[async_trait]
pub trait OrphanPodsCleaner: Send + Sync {
    /// Run one cleanup pass over the cluster's pods
    ///
    /// Returns the reason for every pod that was examined but not deleted.
    async fn clean(&self, cluster: &TidbCluster) -> Result<SkipReasons, CleanError>;
}

/// The production [`OrphanPodsCleaner`]
pub struct DefaultOrphanPodsCleaner {
    pod_lister: Arc<dyn PodLister>,
    pvc_lister: Arc<dyn PvcLister>,
    kube_reader: Arc<dyn KubeReader>,
    pod_control: Arc<dyn PodControl>,
}

impl DefaultOrphanPodsCleaner {
    pub fn new(
        pod_lister: Arc<dyn PodLister>,
        pvc_lister: Arc<dyn PvcLister>,
        kube_reader: Arc<dyn KubeReader>,
        pod_control: Arc<dyn PodControl>,
    ) -> Self {
        Self {
            pod_lister,
            pvc_lister,
            kube_reader,
            pod_control,
        }
    }

    /// Check whether a claim exists, tolerating a stale cache
    ///
    /// The API server is only consulted when the cache reports the claim as
    /// missing. Cache errors are returned as-is.
    pub async fn claim_exists(&self, namespace: &str, name: &str) -> Result<ClaimPresence> {
        if self.pvc_lister.get_pvc(namespace, name).await?.is_some() {
            return Ok(ClaimPresence::Present);
        }
        match self.kube_reader.get_pvc(namespace, name).await? {
            Some(_) => Ok(ClaimPresence::Present),
            None => Ok(ClaimPresence::ConfirmedAbsent),
        }
    }

    /// Examine one cached pod, deleting it if it is an orphan
    ///
    /// Returns `None` when the pod was deleted.
    async fn clean_pod(
        &self,
        cluster: &TidbCluster,
        ns: &str,
        pod: &Pod,
    ) -> Result<Option<SkipReason>> {
        let pod_name = pod.name_any();

        if !role_of(pod.labels()).is_storage_member() {
            return Ok(Some(SkipReason::NotEligibleMember));
        }

        if !is_pending(pod) {
            return Ok(Some(SkipReason::PodNotPending));
        }

        let Some(claim_name) = first_claim_name(pod) else {
            return Ok(Some(SkipReason::ClaimNameEmpty));
        };

        if self.claim_exists(ns, claim_name).await? == ClaimPresence::Present {
            return Ok(Some(SkipReason::ClaimExists));
        }

        // The claim is really gone. Re-read the pod so we never act on a
        // cached copy of an object that has since been replaced.
        let Some(fresh) = self.kube_reader.get_pod(ns, &pod_name).await? else {
            return Ok(Some(SkipReason::PodNotFound));
        };
        if PodIdentity::of(&fresh) != PodIdentity::of(pod) {
            return Ok(Some(SkipReason::PodChanged));
        }

        if let Err(e) = self.pod_control.delete_pod(cluster, pod).await {
            error!(
                "Failed to clean orphan pod {}/{} (claim {}): {}",
                ns, pod_name, claim_name, e
            );
            return Err(e);
        }
        info!(
            "Cleaned orphan pod {}/{} (claim {} not found)",
            ns, pod_name, claim_name
        );
        Ok(None)
    }
}

#[async_trait]
impl OrphanPodsCleaner for DefaultOrphanPodsCleaner {
    async fn clean(&self, cluster: &TidbCluster) -> Result<SkipReasons, CleanError> {
        let mut skipped = SkipReasons::new();

        let ns = match cluster.namespace() {
            Some(ns) => ns,
            None => {
                return Err(CleanError::new(
                    skipped,
                    Error::MissingObjectKey(".metadata.namespace"),
                ));
            }
        };
        let selector = match label::instance_selector(cluster.instance_label()) {
            Ok(selector) => selector,
            Err(e) => return Err(CleanError::new(skipped, e)),
        };
        let pods = match self.pod_lister.list_pods(&ns, &selector).await {
            Ok(pods) => pods,
            Err(e) => return Err(CleanError::new(skipped, e)),
        };

        for pod in &pods {
            match self.clean_pod(cluster, &ns, pod).await {
                Ok(Some(reason)) => {
                    debug!("Skipping pod {}/{}: {}", ns, pod.name_any(), reason);
                    skipped.insert(pod.name_any(), reason);
                }
                Ok(None) => {}
                Err(e) => return Err(CleanError::new(skipped, e)),
            }
        }

        Ok(skipped)
    }
}

/// [`OrphanPodsCleaner`] used when cleanup is disabled
///
/// Never reads or writes anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOrphanPodsCleaner;

#[async_trait]
impl OrphanPodsCleaner for NoopOrphanPodsCleaner {
    async fn clean(&self, _cluster: &TidbCluster) -> Result<SkipReasons, CleanError> {
        Ok(SkipReasons::new())
    }
}
