//! Capabilities: a URI, a closed kind, and the constraints attached to it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constraint::{Constraint, ConstraintSet};

/// What a capability grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Read or write access to a resource.
    Access,
    /// Permission to perform an action.
    Action,
    /// Authority to delegate to others.
    Delegation,
}

impl CapabilityKind {
    /// Wire token for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Action => "action",
            Self::Delegation => "delegation",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named permission with its constraints.
///
/// The URI is an opaque hierarchical string such as `access:read:*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    uri: String,
    kind: CapabilityKind,
    #[serde(default, skip_serializing_if = "ConstraintSet::is_empty")]
    constraints: ConstraintSet,
}

impl Capability {
    /// Create an unconstrained capability.
    pub fn new(uri: impl Into<String>, kind: CapabilityKind) -> Self {
        Self {
            uri: uri.into(),
            kind,
            constraints: ConstraintSet::new(),
        }
    }

    /// Return a copy with `constraint` attached (replacing any existing
    /// constraint on the same dimension).
    #[must_use]
    pub fn with_constraint(&self, constraint: Constraint) -> Self {
        self.with_constraints(std::slice::from_ref(&constraint))
    }

    /// Return a copy whose constraints are overlaid with `overrides`.
    #[must_use]
    pub fn with_constraints(&self, overrides: &[Constraint]) -> Self {
        Self {
            uri: self.uri.clone(),
            kind: self.kind,
            constraints: self.constraints.overlay(overrides),
        }
    }

    /// Return a copy holding exactly `constraints`.
    #[must_use]
    pub fn with_constraint_set(&self, constraints: ConstraintSet) -> Self {
        Self {
            uri: self.uri.clone(),
            kind: self.kind,
            constraints,
        }
    }

    /// Capability URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Capability kind.
    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// All constraints held by this capability, including inert entries.
    pub fn constraint_set(&self) -> &ConstraintSet {
        &self.constraints
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uri, self.kind)
    }
}

/// Whether `child` corresponds to `parent` for tightening purposes.
///
/// Matching is exact URI equality; wildcard URIs are not expanded.
pub fn matches(parent: &Capability, child: &Capability) -> bool {
    parent.uri == child.uri
}

/// The well-formed constraints attached to `capability`.
pub fn constraints_of(capability: &Capability) -> &[Constraint] {
    capability.constraints.constraints()
}
