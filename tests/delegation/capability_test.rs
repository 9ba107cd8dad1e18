//! Tests for `src/delegation/capability.rs`.

use trustgate::delegation::capability::{constraints_of, matches};
use trustgate::delegation::{parse_constraint, Capability, CapabilityKind, Constraint};

fn constraint(raw: &str) -> Constraint {
    parse_constraint(raw).expect("fixture constraint should parse")
}

#[test]
fn matches_requires_identical_uri() {
    let read = Capability::new("access:read:*", CapabilityKind::Access);
    let read_again = Capability::new("access:read:*", CapabilityKind::Access);
    let write = Capability::new("access:write:*", CapabilityKind::Access);
    let narrower = Capability::new("access:read:invoices", CapabilityKind::Access);

    assert!(matches(&read, &read_again));
    assert!(!matches(&read, &write));
    // No wildcard expansion.
    assert!(!matches(&read, &narrower));
}

#[test]
fn matches_ignores_constraints() {
    let parent = Capability::new("action:invoke:search", CapabilityKind::Action)
        .with_constraint(constraint("rate_limit:rpm:60"));
    let child = Capability::new("action:invoke:search", CapabilityKind::Action);
    assert!(matches(&parent, &child));
}

#[test]
fn constraints_of_lists_well_formed_constraints() {
    let cap = Capability::new("access:read:*", CapabilityKind::Access)
        .with_constraint(constraint("resource_limit:cost:500"))
        .with_constraint(constraint("data_scope:table:invoices"));
    let rendered: Vec<String> = constraints_of(&cap).iter().map(ToString::to_string).collect();
    assert_eq!(rendered, ["resource_limit:cost:500", "data_scope:table:invoices"]);
}

#[test]
fn with_constraint_replaces_numeric_bound() {
    let cap = Capability::new("access:read:*", CapabilityKind::Access)
        .with_constraint(constraint("resource_limit:cost:500"))
        .with_constraint(constraint("resource_limit:cost:200"));
    assert_eq!(constraints_of(&cap).len(), 1);
    assert_eq!(constraints_of(&cap)[0].value().as_number(), Some(200.0));
}

#[test]
fn serde_shape_omits_empty_constraints() {
    let bare = Capability::new("delegation:grant:*", CapabilityKind::Delegation);
    let json = serde_json::to_value(&bare).expect("should serialize");
    assert_eq!(
        json,
        serde_json::json!({"uri": "delegation:grant:*", "kind": "delegation"})
    );

    let parsed: Capability = serde_json::from_value(serde_json::json!({
        "uri": "access:read:*",
        "kind": "access",
        "constraints": ["resource_limit:cost:500", "not-a-constraint"]
    }))
    .expect("should deserialize");
    assert_eq!(parsed.kind(), CapabilityKind::Access);
    assert_eq!(constraints_of(&parsed).len(), 1);
    assert_eq!(parsed.constraint_set().malformed(), ["not-a-constraint".to_owned()]);
}

#[test]
fn unknown_kind_is_rejected() {
    let result: Result<Capability, _> =
        serde_json::from_value(serde_json::json!({"uri": "x", "kind": "admin"}));
    assert!(result.is_err());
}
