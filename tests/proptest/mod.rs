// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for member role detection, label selectors and pod identity
//!
//! These tests use proptest to verify that:
//! 1. Role detection depends only on the component label
//! 2. Valid instance names always produce a selector matching their own pods
//! 3. Pod identity equality tracks uid and resourceVersion exactly

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::core::ObjectMeta;
use proptest::prelude::*;

use tidb_operator::controller::PodIdentity;
use tidb_operator::label::{
    COMPONENT_LABEL_KEY, MemberRole, instance_selector, member_labels, role_of,
    validate_label_value,
};

fn pod_with_identity(uid: &str, resource_version: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("demo-pd-0".to_string()),
            uid: Some(uid.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn role_depends_only_on_component(
        component in "[a-z]{0,8}",
        extra in prop::collection::btree_map("[a-z./]{1,20}", "[a-z0-9]{0,10}", 0..5),
    ) {
        let mut labels: BTreeMap<String, String> = extra;
        labels.insert(COMPONENT_LABEL_KEY.to_string(), component.clone());

        let expected = match component.as_str() {
            "pd" => MemberRole::Pd,
            "tikv" => MemberRole::Tikv,
            _ => MemberRole::Other,
        };
        prop_assert_eq!(role_of(&labels), expected);
        prop_assert_eq!(role_of(&labels).is_storage_member(), expected != MemberRole::Other);
    }

    #[test]
    fn valid_instance_selects_its_members(instance in "[a-z0-9]([a-z0-9-]{0,40}[a-z0-9])?") {
        prop_assert!(validate_label_value(&instance).is_ok());
        let selector = instance_selector(Some(&instance)).unwrap();
        prop_assert!(selector.matches(&member_labels(&instance, "pd")));
        prop_assert!(selector.matches(&member_labels(&instance, "tikv")));

        let other = format!("{}x", instance);
        prop_assert!(!selector.matches(&member_labels(&other, "pd")));
    }

    #[test]
    fn instance_with_invalid_characters_is_rejected(
        prefix in "[a-z]{1,5}",
        bad in "[ /:@!]",
        suffix in "[a-z]{1,5}",
    ) {
        let instance = format!("{}{}{}", prefix, bad, suffix);
        prop_assert!(instance_selector(Some(&instance)).is_err());
    }

    #[test]
    fn identity_equality_matches_fields(
        uid_a in "[a-f0-9]{8}",
        uid_b in "[a-f0-9]{8}",
        rv_a in "[0-9]{1,6}",
        rv_b in "[0-9]{1,6}",
    ) {
        let a = PodIdentity::of(&pod_with_identity(&uid_a, &rv_a));
        let b = PodIdentity::of(&pod_with_identity(&uid_b, &rv_b));
        prop_assert_eq!(a == b, uid_a == uid_b && rv_a == rv_b);
    }
}
