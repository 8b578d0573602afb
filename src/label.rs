//! Label conventions for TidbCluster members
//!
//! Every pod the operator manages carries the standard `app.kubernetes.io/*`
//! labels. The instance label ties a pod to its TidbCluster and the component
//! label tells which member role the pod plays.

use std::collections::BTreeMap;
use std::fmt;

use crate::controller::error::{Error, Result};

/// Label key for the application name
pub const NAME_LABEL_KEY: &str = "app.kubernetes.io/name";

/// Label key for the managing operator
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Label key identifying the TidbCluster instance a resource belongs to
pub const INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";

/// Label key for the member component (pd, tikv, tidb)
pub const COMPONENT_LABEL_KEY: &str = "app.kubernetes.io/component";

/// Value of the name label on every TidbCluster resource
pub const TIDB_CLUSTER: &str = "tidb-cluster";

/// Value of the managed-by label
pub const TIDB_OPERATOR: &str = "tidb-operator";

pub const PD_COMPONENT: &str = "pd";
pub const TIKV_COMPONENT: &str = "tikv";
pub const TIDB_COMPONENT: &str = "tidb";

/// Maximum length of a Kubernetes label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Role a pod plays inside a TidbCluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberRole {
    /// Placement driver member
    Pd,
    /// TiKV storage member
    Tikv,
    /// Any other component (tidb, monitors, jobs) or no component label
    Other,
}

impl MemberRole {
    /// Whether members of this role own a persistent volume claim
    pub fn is_storage_member(self) -> bool {
        matches!(self, MemberRole::Pd | MemberRole::Tikv)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRole::Pd => f.write_str(PD_COMPONENT),
            MemberRole::Tikv => f.write_str(TIKV_COMPONENT),
            MemberRole::Other => f.write_str("other"),
        }
    }
}

/// Determine the member role from a pod's labels
pub fn role_of(labels: &BTreeMap<String, String>) -> MemberRole {
    match labels.get(COMPONENT_LABEL_KEY).map(String::as_str) {
        Some(PD_COMPONENT) => MemberRole::Pd,
        Some(TIKV_COMPONENT) => MemberRole::Tikv,
        _ => MemberRole::Other,
    }
}

/// Equality-based label selector
///
/// Only `key=value` requirements are needed to scope pods to a cluster, so
/// this is a plain map rather than the full set-based selector grammar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new(match_labels: BTreeMap<String, String>) -> Self {
        Self { match_labels }
    }

    /// Returns true if every requirement is satisfied by `labels`
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    pub fn match_labels(&self) -> &BTreeMap<String, String> {
        &self.match_labels
    }
}

/// Formats as the `labelSelector` query string (`k1=v1,k2=v2`)
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.match_labels {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Labels shared by every resource the operator manages
pub fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAME_LABEL_KEY.to_string(), TIDB_CLUSTER.to_string()),
        (MANAGED_BY_LABEL_KEY.to_string(), TIDB_OPERATOR.to_string()),
    ])
}

/// Labels for a member pod of the given cluster instance and component
pub fn member_labels(instance: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = managed_labels();
    labels.insert(INSTANCE_LABEL_KEY.to_string(), instance.to_string());
    labels.insert(COMPONENT_LABEL_KEY.to_string(), component.to_string());
    labels
}

/// Selector string matching everything managed by the operator
pub fn managed_selector() -> String {
    LabelSelector::new(managed_labels()).to_string()
}

/// Build the selector that scopes pods to one cluster instance
///
/// Fails if the instance label is missing, empty, or not a valid label value.
pub fn instance_selector(instance: Option<&str>) -> Result<LabelSelector> {
    let instance = match instance {
        Some(value) if !value.is_empty() => value,
        _ => {
            return Err(Error::InvalidSelector(format!(
                "label {} is missing or empty",
                INSTANCE_LABEL_KEY
            )));
        }
    };
    validate_label_value(instance).map_err(|reason| {
        Error::InvalidSelector(format!("{}={}: {}", INSTANCE_LABEL_KEY, instance, reason))
    })?;

    let mut labels = managed_labels();
    labels.insert(INSTANCE_LABEL_KEY.to_string(), instance.to_string());
    Ok(LabelSelector::new(labels))
}

/// Validate a label value against the Kubernetes syntax rules
///
/// At most 63 characters, alphanumerics plus `-`, `_` and `.`, and it must
/// begin and end with an alphanumeric character.
pub fn validate_label_value(value: &str) -> std::result::Result<(), String> {
    if value.len() > MAX_LABEL_VALUE_LEN {
        return Err(format!(
            "must be no more than {} characters",
            MAX_LABEL_VALUE_LEN
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("invalid character '{}'", c));
    }
    let starts_ok = value.chars().next().is_none_or(|c| c.is_ascii_alphanumeric());
    let ends_ok = value.chars().last().is_none_or(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err("must begin and end with an alphanumeric character".to_string());
    }
    Ok(())
}
