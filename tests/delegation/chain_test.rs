//! Tests for `src/delegation/chain.rs`.

use trustgate::delegation::chain::{
    compare_envelopes, loosened_dimensions, narrowed_dimensions, MAX_CHAIN_HOPS,
};
use trustgate::delegation::{
    parse_constraint, Capability, CapabilityKind, ChainError, ChainLink, ConstraintSet,
    DelegationChainBuilder, DelegationError, DelegationProposal, Envelope, PrincipalId,
};

fn root_envelope() -> Envelope {
    Envelope::new(
        vec![
            Capability::new("access:read:*", CapabilityKind::Access),
            Capability::new("action:invoke:search", CapabilityKind::Action),
        ],
        ConstraintSet::from_raw(["resource_limit:cost:500"]),
        3,
        true,
    )
    .expect("valid envelope")
}

fn hop_proposal(source: &str, target: &str, depth: u32, cost: &str) -> DelegationProposal {
    let mut p = DelegationProposal::new(
        source,
        target,
        vec![Capability::new("access:read:*", CapabilityKind::Access)],
    );
    p.requested_depth = depth;
    p.allow_further_delegation = depth > 0;
    p.additional_constraints =
        vec![parse_constraint(&format!("resource_limit:cost:{cost}")).expect("fixture")];
    p.justification = Some(format!("{source} hands off to {target}"));
    p
}

#[test]
fn extend_derives_hops_from_proposals() {
    let chain = DelegationChainBuilder::new("alice", root_envelope())
        .extend(&hop_proposal("alice", "planner", 2, "300"))
        .expect("first hop")
        .extend(&hop_proposal("planner", "worker", 0, "100"))
        .expect("second hop")
        .build();

    assert_eq!(chain.depth(), 2);
    let principals: Vec<&str> = chain
        .principals()
        .into_iter()
        .map(PrincipalId::as_str)
        .collect();
    assert_eq!(principals, ["alice", "planner", "worker"]);

    let leaf = chain.leaf().expect("non-empty");
    assert_eq!(leaf.delegated_by, Some(PrincipalId::new("planner")));
    assert_eq!(leaf.envelope.remaining_depth(), 0);
    assert_eq!(
        leaf.justification.as_deref(),
        Some("planner hands off to worker")
    );
    assert!(chain.root().expect("non-empty").narrowed_dimensions.is_empty());
    assert!(chain.has_narrowing());
}

#[test]
fn narrowed_dimensions_are_recorded_per_hop() {
    let chain = DelegationChainBuilder::new("alice", root_envelope())
        .extend(&hop_proposal("alice", "planner", 2, "300"))
        .expect("hop")
        .build();

    let hop = &chain.hops()[1];
    assert_eq!(
        hop.narrowed_dimensions,
        [
            "capability:action:invoke:search",
            "delegation_depth",
            "resource_limit:cost",
        ]
    );
    assert_eq!(
        chain.all_narrowed_dimensions(),
        [
            "capability:action:invoke:search",
            "delegation_depth",
            "resource_limit:cost",
        ]
    );
}

#[test]
fn extend_rejects_loosening_hop() {
    let result = DelegationChainBuilder::new("alice", root_envelope())
        .extend(&hop_proposal("alice", "planner", 2, "900"));
    match result {
        Err(ChainError::Delegation {
            target,
            source: DelegationError::Rejected(report),
        }) => {
            assert_eq!(target, PrincipalId::new("planner"));
            assert_eq!(report.len(), 1);
        }
        other => panic!("expected rejected delegation, got {other:?}"),
    }
}

#[test]
fn extend_requires_source_to_be_leaf() {
    let result = DelegationChainBuilder::new("alice", root_envelope())
        .extend(&hop_proposal("mallory", "planner", 1, "100"));
    assert!(matches!(result, Err(ChainError::NotLeaf { .. })));
}

#[test]
fn from_links_checks_continuity() {
    let child = Envelope::new(Vec::new(), ConstraintSet::new(), 0, false).expect("valid");
    let links = vec![
        ChainLink {
            principal: PrincipalId::new("alice"),
            delegated_by: None,
            envelope: root_envelope(),
        },
        ChainLink {
            principal: PrincipalId::new("worker"),
            delegated_by: Some(PrincipalId::new("planner")),
            envelope: child,
        },
    ];
    match DelegationChainBuilder::from_links(links) {
        Err(ChainError::Discontinuous {
            principal,
            expected,
            found,
        }) => {
            assert_eq!(principal.as_str(), "worker");
            assert_eq!(expected.as_str(), "alice");
            assert_eq!(found, Some(PrincipalId::new("planner")));
        }
        other => panic!("expected discontinuity, got {other:?}"),
    }
}

#[test]
fn from_links_assembles_chain() {
    let child = Envelope::new(
        vec![Capability::new("access:read:*", CapabilityKind::Access)],
        ConstraintSet::from_raw(["resource_limit:cost:500"]),
        0,
        false,
    )
    .expect("valid");
    let links = vec![
        ChainLink {
            principal: PrincipalId::new("alice"),
            delegated_by: None,
            envelope: root_envelope(),
        },
        ChainLink {
            principal: PrincipalId::new("bot"),
            delegated_by: Some(PrincipalId::new("alice")),
            envelope: child,
        },
    ];
    let chain = DelegationChainBuilder::from_links(links).expect("continuous chain");
    assert_eq!(chain.depth(), 1);
    assert_eq!(
        chain.hops()[1].narrowed_dimensions,
        [
            "allow_further_delegation",
            "capability:action:invoke:search",
            "delegation_depth",
        ]
    );
}

#[test]
fn stored_hop_that_loosens_is_reported_separately() {
    let root = Envelope::new(
        Vec::new(),
        ConstraintSet::from_raw(["resource_limit:cost:500", "rate_limit:rpm:60"]),
        3,
        true,
    )
    .expect("valid");
    let child = Envelope::new(
        Vec::new(),
        ConstraintSet::from_raw(["resource_limit:cost:1000"]),
        1,
        true,
    )
    .expect("valid");
    let links = vec![
        ChainLink {
            principal: PrincipalId::new("alice"),
            delegated_by: None,
            envelope: root,
        },
        ChainLink {
            principal: PrincipalId::new("bot"),
            delegated_by: Some(PrincipalId::new("alice")),
            envelope: child,
        },
    ];
    let chain = DelegationChainBuilder::from_links(links).expect("continuous chain");

    let hop = &chain.hops()[1];
    assert_eq!(hop.narrowed_dimensions, ["delegation_depth"]);
    assert_eq!(
        hop.loosened_dimensions,
        ["rate_limit:rpm", "resource_limit:cost"]
    );
    assert!(chain.has_loosening());

    let json = serde_json::to_value(&chain).expect("should serialize");
    assert_eq!(json["hops"][1]["loosened_dimensions"][0], "rate_limit:rpm");
    assert!(json["hops"][0].get("loosened_dimensions").is_none());
}

#[test]
fn mixed_period_rates_are_classified_per_hour() {
    let parent = Envelope::new(
        Vec::new(),
        ConstraintSet::from_raw(["rate_limit:requests:100/day"]),
        2,
        true,
    )
    .expect("valid");
    let hourly = Envelope::new(
        Vec::new(),
        ConstraintSet::from_raw(["rate_limit:requests:99/hour"]),
        2,
        true,
    )
    .expect("valid");
    let changes = compare_envelopes(&parent, &hourly);
    assert!(changes.narrowed.is_empty());
    assert_eq!(changes.loosened, ["rate_limit:requests"]);

    let both = Envelope::new(
        Vec::new(),
        ConstraintSet::from_raw(["rate_limit:requests:100/day", "rate_limit:requests:2/hour"]),
        2,
        true,
    )
    .expect("valid");
    assert_eq!(narrowed_dimensions(&parent, &both), ["rate_limit:requests"]);
    assert!(loosened_dimensions(&parent, &both).is_empty());
}

#[test]
fn extra_capability_and_dropped_bound_are_loosening() {
    let parent = root_envelope();
    let child = Envelope::new(
        vec![
            Capability::new("access:read:*", CapabilityKind::Access),
            Capability::new("action:invoke:search", CapabilityKind::Action),
            Capability::new("access:write:*", CapabilityKind::Access),
        ],
        ConstraintSet::new(),
        3,
        true,
    )
    .expect("valid");
    assert_eq!(
        loosened_dimensions(&parent, &child),
        ["capability:access:write:*", "resource_limit:cost"]
    );
    assert!(narrowed_dimensions(&parent, &child).is_empty());
}

#[test]
fn derived_chains_never_loosen() {
    let chain = DelegationChainBuilder::new("alice", root_envelope())
        .extend(&hop_proposal("alice", "planner", 2, "300"))
        .expect("first hop")
        .extend(&hop_proposal("planner", "worker", 0, "100"))
        .expect("second hop")
        .build();
    assert!(!chain.has_loosening());
}

#[test]
fn from_links_rejects_empty() {
    assert!(matches!(
        DelegationChainBuilder::from_links(Vec::new()),
        Err(ChainError::Empty)
    ));
}

#[test]
fn push_stops_at_hop_limit() {
    let env = Envelope::new(Vec::new(), ConstraintSet::new(), 1, true).expect("valid");
    let mut builder = DelegationChainBuilder::new("p0", env.clone());
    for i in 1..MAX_CHAIN_HOPS {
        builder = builder
            .push(format!("p{i}"), env.clone())
            .expect("under the limit");
    }
    assert!(matches!(
        builder.push("one-too-many", env),
        Err(ChainError::TooLong)
    ));
}

#[test]
fn identical_envelopes_narrow_nothing() {
    assert!(narrowed_dimensions(&root_envelope(), &root_envelope()).is_empty());
}

#[test]
fn chain_serializes_hops() {
    let chain = DelegationChainBuilder::new("alice", root_envelope()).build();
    let json = serde_json::to_value(&chain).expect("should serialize");
    assert_eq!(json["hops"][0]["principal"], "alice");
    assert_eq!(json["hops"][0]["envelope"]["remaining_depth"], 3);
}
