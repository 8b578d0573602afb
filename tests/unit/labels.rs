//! Unit tests for label conventions

use std::collections::BTreeMap;

use tidb_operator::label::{
    COMPONENT_LABEL_KEY, INSTANCE_LABEL_KEY, MemberRole, instance_selector, managed_selector,
    member_labels, role_of,
};

#[test]
fn test_role_of_only_looks_at_component() {
    let labels = BTreeMap::from([(COMPONENT_LABEL_KEY.to_string(), "tikv".to_string())]);
    assert_eq!(role_of(&labels), MemberRole::Tikv);
}

#[test]
fn test_role_of_unknown_component() {
    for component in ["tidb", "pump", "ticdc", "tiflash", ""] {
        assert_eq!(
            role_of(&member_labels("demo", component)),
            MemberRole::Other,
            "component {:?}",
            component
        );
    }
}

#[test]
fn test_selector_scopes_to_instance() {
    let selector = instance_selector(Some("demo")).unwrap();

    assert!(selector.matches(&member_labels("demo", "pd")));
    assert!(selector.matches(&member_labels("demo", "tidb")));
    assert!(!selector.matches(&member_labels("demo2", "pd")));

    let mut foreign = member_labels("demo", "pd");
    foreign.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "someone-else".to_string(),
    );
    assert!(!selector.matches(&foreign));
}

#[test]
fn test_selector_requires_instance() {
    assert!(instance_selector(None).is_err());
    assert!(instance_selector(Some("")).is_err());
}

#[test]
fn test_managed_selector_has_no_instance() {
    let selector = managed_selector();
    assert!(!selector.contains(INSTANCE_LABEL_KEY));
    assert!(selector.contains("app.kubernetes.io/managed-by=tidb-operator"));
}
