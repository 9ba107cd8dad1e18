//! Constraint-tightening validator.
//!
//! A child envelope may never be less restrictive than its parent along
//! any dimension the parent already restricts. [`validate`] collects every
//! violation in one pass instead of stopping at the first, so a caller can
//! present the complete list at once.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::capability::{constraints_of, matches, Capability};
use super::constraint::{tightest_bound, Constraint, ConstraintKind, ConstraintSet};
use super::depth;
use super::envelope::{DelegationProposal, Envelope, ProposalError};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Category of a single violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The requested capability is absent from the delegator's envelope.
    CapabilityNotHeld,
    /// The requested capability is held under a different kind.
    CapabilityKindMismatch,
    /// The requested depth exceeds the delegator's remaining depth.
    DepthExceeded,
    /// The delegator's envelope does not permit further delegation.
    TerminalEnvelope,
    /// A constraint is looser than the delegator's on the same dimension.
    ConstraintTighteningViolation,
    /// The requested expiry outlives the delegator's grant.
    ExpirationExceeded,
}

/// One offending dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// What kind of rule was broken.
    pub kind: ViolationKind,
    /// Dimension that was loosened (`kind:field`, `delegation_depth`, a
    /// capability URI, or `expires_at`).
    pub dimension: String,
    /// Capability the violation is scoped to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// The delegator's bound, rendered as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_bound: Option<String>,
    /// The requested value, rendered as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<String>,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.capability {
            Some(uri) => write!(f, "[{uri}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Ordered list of violations. Empty means the proposal is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationReport {
    violations: Vec<Violation>,
}

impl ViolationReport {
    /// Whether no violations were found.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Whether the report is empty.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations in report order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Whether any violation has the given kind.
    pub fn contains(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    /// Iterate over violations.
    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.violations.iter()
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl IntoIterator for ViolationReport {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.into_iter()
    }
}

impl<'a> IntoIterator for &'a ViolationReport {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.iter()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate `proposal` against the delegator's `parent` envelope.
///
/// Checks run in a fixed order and never short-circuit: capability
/// possession, depth, terminal envelope, global constraints, per-capability
/// constraints, then expiry. Constraints on a capability the parent does not
/// hold are not compared. Malformed constraints already in `parent` are
/// inert.
///
/// # Errors
///
/// Returns a [`ProposalError`] when the proposal is structurally invalid.
/// Rule violations are never errors; they are returned in the report.
pub fn validate(
    parent: &Envelope,
    proposal: &DelegationProposal,
) -> Result<ViolationReport, ProposalError> {
    proposal.check_structure()?;

    let mut report = ViolationReport::default();

    let held: Vec<(&Capability, &Capability)> = proposal
        .capabilities
        .iter()
        .filter_map(|requested| check_possession(parent, requested, &mut report))
        .collect();

    check_depth(parent, proposal, &mut report);
    check_terminal(parent, proposal, &mut report);

    for requested in &proposal.additional_constraints {
        check_tightening(&[parent.constraint_set()], requested, None, &mut report);
    }

    for (parent_cap, requested_cap) in held {
        let bounds = [parent_cap.constraint_set(), parent.constraint_set()];
        for requested in constraints_of(requested_cap) {
            check_tightening(&bounds, requested, Some(requested_cap.uri()), &mut report);
        }
    }

    check_expiry(parent, proposal, &mut report);

    Ok(report)
}

/// Pair a requested capability with the held one, recording a violation
/// when it is missing or held under another kind.
fn check_possession<'a>(
    parent: &'a Envelope,
    requested: &'a Capability,
    report: &mut ViolationReport,
) -> Option<(&'a Capability, &'a Capability)> {
    let Some(held) = parent
        .capabilities()
        .iter()
        .find(|held| matches(held, requested))
    else {
        report.push(Violation {
            kind: ViolationKind::CapabilityNotHeld,
            dimension: requested.uri().to_owned(),
            capability: Some(requested.uri().to_owned()),
            parent_bound: None,
            requested: Some(requested.uri().to_owned()),
            message: "Capability not held by delegator".to_owned(),
        });
        return None;
    };

    if held.kind() != requested.kind() {
        report.push(Violation {
            kind: ViolationKind::CapabilityKindMismatch,
            dimension: requested.uri().to_owned(),
            capability: Some(requested.uri().to_owned()),
            parent_bound: Some(held.kind().to_string()),
            requested: Some(requested.kind().to_string()),
            message: format!(
                "Capability is held as {} but was requested as {}.",
                held.kind(),
                requested.kind()
            ),
        });
        return None;
    }

    Some((held, requested))
}

fn check_depth(parent: &Envelope, proposal: &DelegationProposal, report: &mut ViolationReport) {
    if depth::exceeds(parent.remaining_depth(), proposal.requested_depth) {
        report.push(Violation {
            kind: ViolationKind::DepthExceeded,
            dimension: "delegation_depth".to_owned(),
            capability: None,
            parent_bound: Some(parent.remaining_depth().to_string()),
            requested: Some(proposal.requested_depth.to_string()),
            message: format!(
                "Cannot exceed your delegation depth of {}. You set {}.",
                parent.remaining_depth(),
                proposal.requested_depth
            ),
        });
    }
}

/// A terminal parent rejects every proposal; the message names what the
/// proposal asked for.
fn check_terminal(parent: &Envelope, proposal: &DelegationProposal, report: &mut ViolationReport) {
    if !parent.is_terminal() {
        return;
    }

    let message = if depth::is_terminal(parent.remaining_depth()) {
        if proposal.requested_depth > 0 || proposal.allow_further_delegation {
            format!(
                "Your delegation depth is exhausted. Cannot grant depth {} or further delegation.",
                proposal.requested_depth
            )
        } else {
            "Your delegation depth is exhausted. Further delegation is not permitted.".to_owned()
        }
    } else {
        "Your envelope does not permit further delegation.".to_owned()
    };

    report.push(Violation {
        kind: ViolationKind::TerminalEnvelope,
        dimension: "allow_further_delegation".to_owned(),
        capability: None,
        parent_bound: Some(parent.allow_further_delegation().to_string()),
        requested: Some(proposal.allow_further_delegation.to_string()),
        message,
    });
}

/// Compare `requested` with the tightest parent bound on the same dimension
/// across `bounds`.
///
/// New dimensions are always allowed. Opaque values are presence-only and
/// never compared by magnitude. Rates over different periods are compared
/// per hour; a rate and a plain amount are never compared.
fn check_tightening(
    bounds: &[&ConstraintSet],
    requested: &Constraint,
    capability: Option<&str>,
    report: &mut ViolationReport,
) {
    let candidates = bounds.iter().copied().flat_map(ConstraintSet::constraints);
    let Some(bound) = tightest_bound(candidates, requested) else {
        return;
    };
    if requested.tightness(bound) != Some(Ordering::Less) {
        return;
    }

    let parent_raw = bound.value().raw();
    let child_raw = requested.value().raw();
    let message = match requested.kind() {
        ConstraintKind::ResourceLimit => {
            format!("Cannot exceed your limit of {parent_raw}. You set {child_raw}.")
        }
        ConstraintKind::RateLimit => {
            format!("Rate limit {child_raw} exceeds your limit of {parent_raw}.")
        }
        ConstraintKind::TimeWindow
        | ConstraintKind::DataScope
        | ConstraintKind::ActionRestriction
        | ConstraintKind::AuditRequirement => format!(
            "{} {} of {child_raw} is looser than your bound of {parent_raw}.",
            requested.kind(),
            requested.field()
        ),
    };

    report.push(Violation {
        kind: ViolationKind::ConstraintTighteningViolation,
        dimension: requested.dimension(),
        capability: capability.map(str::to_owned),
        parent_bound: Some(parent_raw.to_owned()),
        requested: Some(child_raw.to_owned()),
        message,
    });
}

fn check_expiry(parent: &Envelope, proposal: &DelegationProposal, report: &mut ViolationReport) {
    let Some(parent_expiry) = parent.expires_at() else {
        return;
    };

    let (requested, message) = match proposal.expires_at {
        Some(child) if child <= parent_expiry => return,
        Some(child) => (
            child.to_rfc3339(),
            format!(
                "Cannot outlive your grant, which expires at {}. You set {}.",
                parent_expiry.to_rfc3339(),
                child.to_rfc3339()
            ),
        ),
        None => (
            "never".to_owned(),
            format!(
                "Your grant expires at {}. The delegation must expire too.",
                parent_expiry.to_rfc3339()
            ),
        ),
    };

    report.push(Violation {
        kind: ViolationKind::ExpirationExceeded,
        dimension: "expires_at".to_owned(),
        capability: None,
        parent_bound: Some(parent_expiry.to_rfc3339()),
        requested: Some(requested),
        message,
    });
}
