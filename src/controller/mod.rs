pub mod context;
pub mod error;
pub mod kube_reader;
pub mod listers;
pub mod orphan_pods_cleaner;
pub mod pod_control;
pub mod reconciler;

pub use context::Context;
pub use error::{BackoffConfig, Error, ErrorContext, Result};
pub use kube_reader::{ApiKubeReader, KubeReader};
pub use listers::{PodLister, PvcLister, StorePodLister, StorePvcLister};
pub use orphan_pods_cleaner::{
    ClaimPresence, CleanError, DefaultOrphanPodsCleaner, NoopOrphanPodsCleaner,
    OrphanPodsCleaner, PodIdentity, SkipReason, SkipReasons,
};
pub use pod_control::{PodControl, RealPodControl};
pub use reconciler::{FIELD_MANAGER, cluster_ref_for_pod, error_policy, reconcile};
