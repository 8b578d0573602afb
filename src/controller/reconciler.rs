//! Reconciliation logic for TidbCluster resources
//!
//! Each reconciliation makes sure the cluster carries its instance label and
//! then runs one orphan pod cleanup pass over the cluster's PD and TiKV pods.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::orphan_pods_cleaner::SkipReasons;
use crate::crd::TidbCluster;
use crate::label::INSTANCE_LABEL_KEY;

/// Field manager used for server-side patches
pub const FIELD_MANAGER: &str = "tidb-operator";

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = %cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<TidbCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = cluster.name_any();
    let key = format!("{}/{}", ns, name);

    if cluster.metadata.deletion_timestamp.is_some() {
        debug!("TidbCluster is being deleted, skipping orphan pod cleanup");
        return Ok(Action::await_change());
    }

    if cluster.instance_label().is_none() {
        add_instance_label(&cluster, &ctx, &ns).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    match ctx.cleaner.clean(&cluster).await {
        Ok(skipped) => {
            record_skipped(&ctx, &skipped);
            debug!("Orphan pod cleanup finished, {} pod(s) skipped", skipped.len());
            ctx.reset_errors(&key);
            if let Some(ref state) = ctx.health_state {
                state
                    .metrics
                    .record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
            }
            Ok(Action::requeue(ctx.reconcile_interval))
        }
        Err(e) => {
            record_skipped(&ctx, &e.skipped);
            error!(
                "Orphan pod cleanup aborted after {} skipped pod(s): {}",
                e.skipped.len(),
                e.source
            );
            if let Some(ref state) = ctx.health_state {
                state.metrics.record_error(&ns, &name);
            }
            Err(e.into_source())
        }
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<TidbCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let key = format!("{}/{}", cluster.namespace().unwrap_or_default(), name);

    let attempt = ctx.record_error(&key, error);
    let delay = ctx
        .backoff
        .delay_for_error(error, attempt.saturating_sub(1));

    if error.is_retryable() {
        warn!(
            "Retryable error for {} (attempt {}): {:?}, requeuing in {:?}",
            name, attempt, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// Map a member pod back to the TidbCluster that owns it
///
/// Pods are matched through the instance label, whose value is the cluster name.
pub fn cluster_ref_for_pod(pod: &Pod) -> Option<ObjectRef<TidbCluster>> {
    let instance = pod.labels().get(INSTANCE_LABEL_KEY)?;
    let ns = pod.namespace()?;
    Some(ObjectRef::new(instance).within(&ns))
}

fn record_skipped(ctx: &Context, skipped: &SkipReasons) {
    if let Some(ref state) = ctx.health_state {
        for reason in skipped.values() {
            state.metrics.record_orphan_skipped(reason.as_str());
        }
    }
}

/// Label the cluster with its own name as the instance label
async fn add_instance_label(cluster: &TidbCluster, ctx: &Context, ns: &str) -> Result<()> {
    let name = cluster.name_any();
    let api: Api<TidbCluster> = Api::namespaced(ctx.client.clone(), ns);

    let patch = serde_json::json!({
        "metadata": {
            "labels": BTreeMap::from([(INSTANCE_LABEL_KEY, name.as_str())])
        }
    });

    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    info!("Added {}={} label to TidbCluster", INSTANCE_LABEL_KEY, name);
    Ok(())
}
