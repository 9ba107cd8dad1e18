//! Tests for `src/delegation/envelope.rs`.

use chrono::{TimeZone, Utc};
use trustgate::delegation::{
    parse_constraint, Capability, CapabilityKind, ConstraintSet, DelegationError,
    DelegationProposal, Envelope, EnvelopeError, PrincipalId, ProposalError, ViolationKind,
};

fn root_envelope() -> Envelope {
    let read = Capability::new("access:read:*", CapabilityKind::Access)
        .with_constraint(parse_constraint("resource_limit:cost:500").expect("fixture"));
    let invoke = Capability::new("action:invoke:search", CapabilityKind::Action);
    Envelope::new(
        vec![read, invoke],
        ConstraintSet::from_raw(["rate_limit:rpm:60", "data_scope:region:eu"]),
        3,
        true,
    )
    .expect("valid envelope")
}

#[test]
fn terminal_envelope_cannot_allow_delegation() {
    let result = Envelope::new(Vec::new(), ConstraintSet::new(), 0, true);
    assert_eq!(result, Err(EnvelopeError::TerminalAllowsDelegation));

    let terminal = Envelope::new(Vec::new(), ConstraintSet::new(), 0, false).expect("valid");
    assert!(terminal.is_terminal());
}

#[test]
fn flag_off_is_terminal_even_with_depth() {
    let env = Envelope::new(Vec::new(), ConstraintSet::new(), 2, false).expect("valid");
    assert!(env.is_terminal());
}

#[test]
fn deserializing_enforces_terminal_invariant() {
    let bad = serde_json::json!({
        "capabilities": [],
        "remaining_depth": 0,
        "allow_further_delegation": true
    });
    assert!(serde_json::from_value::<Envelope>(bad).is_err());
}

#[test]
fn envelope_serde_keeps_malformed_constraints() {
    let json = serde_json::json!({
        "capabilities": [{"uri": "access:read:*", "kind": "access"}],
        "constraints": ["resource_limit:cost:500", "???"],
        "remaining_depth": 2,
        "allow_further_delegation": true
    });
    let env: Envelope = serde_json::from_value(json).expect("should deserialize");
    assert_eq!(env.constraints().len(), 1);
    assert_eq!(env.malformed_constraints(), ["???".to_owned()]);

    let back = serde_json::to_value(&env).expect("should serialize");
    assert_eq!(
        back["constraints"],
        serde_json::json!(["resource_limit:cost:500", "???"])
    );
}

#[test]
fn delegate_derives_narrowed_child() {
    let parent = root_envelope();
    let mut proposal = DelegationProposal::new(
        "alice",
        "bot-1",
        vec![Capability::new("access:read:*", CapabilityKind::Access)
            .with_constraint(parse_constraint("resource_limit:cost:200").expect("fixture"))],
    );
    proposal.additional_constraints = vec![parse_constraint("rate_limit:rpm:30").expect("fixture")];
    proposal.requested_depth = 1;
    proposal.allow_further_delegation = true;

    let child = parent.delegate(&proposal).expect("should delegate");

    assert_eq!(child.capabilities().len(), 1);
    let read = child.capability("access:read:*").expect("granted");
    let cost = read.constraint_set().constraints();
    assert_eq!(cost.len(), 1);
    assert_eq!(cost[0].value().as_number(), Some(200.0));

    let globals: Vec<String> = child.constraints().iter().map(ToString::to_string).collect();
    assert_eq!(globals, ["rate_limit:rpm:30", "data_scope:region:eu"]);
    assert_eq!(child.remaining_depth(), 1);
    assert!(child.allow_further_delegation());

    // Parent is untouched.
    assert_eq!(parent, root_envelope());
}

#[test]
fn delegate_inherits_held_constraints() {
    let parent = root_envelope();
    let proposal = DelegationProposal::new(
        "alice",
        "bot-1",
        vec![Capability::new("access:read:*", CapabilityKind::Access)],
    );
    let child = parent.delegate(&proposal).expect("should delegate");
    let read = child.capability("access:read:*").expect("granted");
    assert_eq!(read.constraint_set().constraints().len(), 1);
    assert_eq!(child.remaining_depth(), 0);
    assert!(!child.allow_further_delegation());
}

#[test]
fn zero_depth_child_never_allows_delegation() {
    let parent = root_envelope();
    let mut proposal = DelegationProposal::new(
        "alice",
        "bot-1",
        vec![Capability::new("action:invoke:search", CapabilityKind::Action)],
    );
    proposal.allow_further_delegation = true;
    let child = parent.delegate(&proposal).expect("should delegate");
    assert!(!child.allow_further_delegation());
    assert!(child.is_terminal());
}

#[test]
fn delegate_returns_full_report_on_rejection() {
    let parent = root_envelope();
    let mut proposal = DelegationProposal::new(
        "alice",
        "bot-1",
        vec![Capability::new("access:write:*", CapabilityKind::Access)],
    );
    proposal.requested_depth = 9;

    let err = parent.delegate(&proposal).expect_err("should reject");
    let report = match err {
        DelegationError::Rejected(report) => report,
        other => panic!("expected rejection, got {other:?}"),
    };
    assert_eq!(report.len(), 2);
    assert!(report.contains(ViolationKind::CapabilityNotHeld));
    assert!(report.contains(ViolationKind::DepthExceeded));
}

#[test]
fn delegate_inherits_parent_expiry() {
    let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().expect("valid date");
    let parent = root_envelope().with_expiry(expiry);
    let mut proposal = DelegationProposal::new(
        "alice",
        "bot-1",
        vec![Capability::new("action:invoke:search", CapabilityKind::Action)],
    );
    proposal.expires_at = Some(expiry);
    let child = parent.delegate(&proposal).expect("should delegate");
    assert_eq!(child.expires_at(), Some(expiry));
}

// ---------------------------------------------------------------------------
// Proposal structure
// ---------------------------------------------------------------------------

fn any_cap() -> Vec<Capability> {
    vec![Capability::new("access:read:*", CapabilityKind::Access)]
}

#[test]
fn blank_source_or_target_is_structural_error() {
    let p = DelegationProposal::new("  ", "bot", any_cap());
    assert_eq!(p.check_structure(), Err(ProposalError::MissingSource));

    let p = DelegationProposal::new("alice", "", any_cap());
    assert_eq!(p.check_structure(), Err(ProposalError::MissingTarget));
}

#[test]
fn self_delegation_is_structural_error() {
    let p = DelegationProposal::new("alice", "alice", any_cap());
    assert_eq!(
        p.check_structure(),
        Err(ProposalError::SelfDelegation(PrincipalId::new("alice")))
    );
}

#[test]
fn empty_capabilities_is_structural_error() {
    let p = DelegationProposal::new("alice", "bot", Vec::new());
    assert_eq!(p.check_structure(), Err(ProposalError::NoCapabilities));
}

#[test]
fn repeated_capability_is_structural_error() {
    let mut caps = any_cap();
    caps.extend(any_cap());
    let p = DelegationProposal::new("alice", "bot", caps);
    assert_eq!(
        p.check_structure(),
        Err(ProposalError::DuplicateCapability("access:read:*".to_owned()))
    );

    let err = root_envelope().delegate(&p).expect_err("should fail");
    assert!(matches!(
        err,
        DelegationError::Invalid(ProposalError::DuplicateCapability(_))
    ));
}

#[test]
fn malformed_requested_constraint_is_structural_error() {
    let cap: Capability = serde_json::from_value(serde_json::json!({
        "uri": "access:read:*",
        "kind": "access",
        "constraints": ["cost<=5"]
    }))
    .expect("should deserialize");
    let p = DelegationProposal::new("alice", "bot", vec![cap]);
    assert_eq!(
        p.check_structure(),
        Err(ProposalError::MalformedConstraint {
            capability: "access:read:*".to_owned(),
            raw: "cost<=5".to_owned(),
        })
    );

    let err = root_envelope().delegate(&p).expect_err("should fail");
    assert!(matches!(err, DelegationError::Invalid(_)));
}

#[test]
fn proposal_json_defaults_optional_fields() {
    let p: DelegationProposal = serde_json::from_value(serde_json::json!({
        "source": "alice",
        "target": "bot",
        "capabilities": [{"uri": "access:read:*", "kind": "access"}]
    }))
    .expect("should deserialize");
    assert_eq!(p.requested_depth, 0);
    assert!(!p.allow_further_delegation);
    assert!(p.additional_constraints.is_empty());
    assert!(p.expires_at.is_none());
}

#[test]
fn proposal_json_rejects_malformed_additional_constraint() {
    let result = serde_json::from_value::<DelegationProposal>(serde_json::json!({
        "source": "alice",
        "target": "bot",
        "capabilities": [{"uri": "access:read:*", "kind": "access"}],
        "additional_constraints": ["resource_limit"]
    }));
    assert!(result.is_err());
}
