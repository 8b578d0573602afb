use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::label::INSTANCE_LABEL_KEY;

/// TidbCluster is the Schema for the tidbclusters API
///
/// Only the member topology the operator acts on is modeled here.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "pingcap.com",
    version = "v1alpha1",
    kind = "TidbCluster",
    plural = "tidbclusters",
    shortname = "tc",
    namespaced,
    printcolumn = r#"{"name":"PD", "type":"integer", "jsonPath":".spec.pd.replicas"}"#,
    printcolumn = r#"{"name":"TiKV", "type":"integer", "jsonPath":".spec.tikv.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TidbClusterSpec {
    /// Placement driver members
    pub pd: StorageMemberSpec,

    /// TiKV storage members
    pub tikv: StorageMemberSpec,

    /// TiDB SQL layer (stateless, no volumes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tidb: Option<StatelessMemberSpec>,
}

/// A member group backed by one persistent volume claim per pod
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageMemberSpec {
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Size of each member's volume (e.g., "10Gi")
    pub storage_size: String,

    /// Storage class name (uses default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatelessMemberSpec {
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

impl TidbCluster {
    /// Value of the instance label that scopes this cluster's pods
    pub fn instance_label(&self) -> Option<&str> {
        self.labels().get(INSTANCE_LABEL_KEY).map(String::as_str)
    }
}
