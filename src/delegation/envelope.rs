//! Envelopes and delegation proposals.
//!
//! An [`Envelope`] is the authorization context one principal holds at one
//! point in a chain. Envelopes are never mutated: accepting a
//! [`DelegationProposal`] derives a new child envelope via
//! [`Envelope::delegate`].

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capability::{constraints_of, Capability};
use super::constraint::{Constraint, ConstraintSet};
use super::depth;
use super::validator::{validate, ViolationReport};

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// Identifier of an agent or human authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is blank.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors constructing an envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// A terminal envelope claimed to allow further delegation.
    #[error("envelope with remaining depth 0 cannot allow further delegation")]
    TerminalAllowsDelegation,
}

/// Structural problems with a proposal. These are hard errors, not
/// violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposalError {
    /// Source principal id is blank.
    #[error("proposal is missing a source principal")]
    MissingSource,
    /// Target principal id is blank.
    #[error("proposal is missing a target principal")]
    MissingTarget,
    /// Source and target are the same principal.
    #[error("principal {0} cannot delegate to itself")]
    SelfDelegation(PrincipalId),
    /// No capabilities were requested.
    #[error("proposal requests no capabilities")]
    NoCapabilities,
    /// The same capability URI was requested more than once.
    #[error("capability {0} is requested more than once")]
    DuplicateCapability(String),
    /// A requested capability carries a constraint that failed to parse.
    #[error("capability {capability} carries malformed constraint '{raw}'")]
    MalformedConstraint {
        /// URI of the capability.
        capability: String,
        /// The unparseable entry.
        raw: String,
    },
}

/// Why a delegation could not produce a child envelope.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DelegationError {
    /// The proposal is structurally invalid.
    #[error(transparent)]
    Invalid(#[from] ProposalError),
    /// The proposal loosens the parent envelope.
    #[error("delegation rejected with {} violation(s)", .0.len())]
    Rejected(ViolationReport),
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// At-rest form of an [`Envelope`], as exchanged with the trust-chain store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    /// Capabilities held.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Global constraints as raw `kind:field:value` strings.
    #[serde(default)]
    pub constraints: ConstraintSet,
    /// Remaining delegation depth.
    pub remaining_depth: u32,
    /// Whether the holder may delegate further.
    #[serde(default)]
    pub allow_further_delegation: bool,
    /// When the grant lapses, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The full authorization context held by one principal.
///
/// Invariant: `remaining_depth == 0` implies `!allow_further_delegation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeRecord", into = "EnvelopeRecord")]
pub struct Envelope {
    capabilities: Vec<Capability>,
    constraints: ConstraintSet,
    remaining_depth: u32,
    allow_further_delegation: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Build an envelope, enforcing the terminal-depth invariant.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::TerminalAllowsDelegation`] when
    /// `remaining_depth` is 0 but further delegation is allowed.
    pub fn new(
        capabilities: Vec<Capability>,
        constraints: ConstraintSet,
        remaining_depth: u32,
        allow_further_delegation: bool,
    ) -> Result<Self, EnvelopeError> {
        if depth::is_terminal(remaining_depth) && allow_further_delegation {
            return Err(EnvelopeError::TerminalAllowsDelegation);
        }
        Ok(Self {
            capabilities,
            constraints,
            remaining_depth,
            allow_further_delegation,
            expires_at: None,
        })
    }

    /// Return a copy that lapses at `expires_at`.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Capabilities held.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Look up a held capability by exact URI.
    pub fn capability(&self, uri: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.uri() == uri)
    }

    /// Global constraints, including inert malformed entries.
    pub fn constraint_set(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Well-formed global constraints.
    pub fn constraints(&self) -> &[Constraint] {
        self.constraints.constraints()
    }

    /// Global constraint entries that failed to parse.
    pub fn malformed_constraints(&self) -> &[String] {
        self.constraints.malformed()
    }

    /// Remaining delegation depth.
    pub fn remaining_depth(&self) -> u32 {
        self.remaining_depth
    }

    /// Whether the holder may delegate at all.
    pub fn allow_further_delegation(&self) -> bool {
        self.allow_further_delegation
    }

    /// When the grant lapses, if ever.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether this envelope can never delegate again.
    pub fn is_terminal(&self) -> bool {
        depth::is_terminal(self.remaining_depth) || !self.allow_further_delegation
    }

    /// Validate `proposal` against this envelope and, if it holds, derive
    /// the child envelope. `self` is left untouched.
    ///
    /// Each granted capability inherits the held capability's constraints
    /// with the requested ones layered on top; global constraints are
    /// layered the same way.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::Invalid`] for structural problems and
    /// [`DelegationError::Rejected`] with the full report otherwise.
    pub fn delegate(&self, proposal: &DelegationProposal) -> Result<Envelope, DelegationError> {
        let report = validate(self, proposal)?;
        if !report.is_valid() {
            return Err(DelegationError::Rejected(report));
        }

        let capabilities = proposal
            .capabilities
            .iter()
            .filter_map(|requested| {
                self.capability(requested.uri())
                    .map(|held| held.with_constraints(constraints_of(requested)))
            })
            .collect();

        let remaining_depth = depth::next_depth(self.remaining_depth, proposal.requested_depth);

        Ok(Envelope {
            capabilities,
            constraints: self.constraints.overlay(&proposal.additional_constraints),
            remaining_depth,
            allow_further_delegation: depth::allows_further(
                remaining_depth,
                proposal.allow_further_delegation,
            ),
            expires_at: proposal.expires_at.or(self.expires_at),
        })
    }
}

impl TryFrom<EnvelopeRecord> for Envelope {
    type Error = EnvelopeError;

    fn try_from(record: EnvelopeRecord) -> Result<Self, Self::Error> {
        let envelope = Self::new(
            record.capabilities,
            record.constraints,
            record.remaining_depth,
            record.allow_further_delegation,
        )?;
        Ok(Self {
            expires_at: record.expires_at,
            ..envelope
        })
    }
}

impl From<Envelope> for EnvelopeRecord {
    fn from(envelope: Envelope) -> Self {
        Self {
            capabilities: envelope.capabilities,
            constraints: envelope.constraints,
            remaining_depth: envelope.remaining_depth,
            allow_further_delegation: envelope.allow_further_delegation,
            expires_at: envelope.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// A request for `source` to delegate part of its envelope to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationProposal {
    /// Delegating principal.
    pub source: PrincipalId,
    /// Receiving principal. Must differ from `source`.
    pub target: PrincipalId,
    /// Requested capability subset, with any constraints to attach.
    pub capabilities: Vec<Capability>,
    /// Global constraints to add on top of the source's.
    #[serde(default)]
    pub additional_constraints: Vec<Constraint>,
    /// Depth the child should receive.
    #[serde(default)]
    pub requested_depth: u32,
    /// Whether the child may delegate further.
    #[serde(default)]
    pub allow_further_delegation: bool,
    /// When the child grant should lapse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-text reason shown to reviewers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

impl DelegationProposal {
    /// A proposal for `capabilities` with no extra constraints, depth 0.
    pub fn new(
        source: impl Into<PrincipalId>,
        target: impl Into<PrincipalId>,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            capabilities,
            additional_constraints: Vec::new(),
            requested_depth: 0,
            allow_further_delegation: false,
            expires_at: None,
            justification: None,
        }
    }

    /// Check the proposal is well-formed enough to validate.
    ///
    /// # Errors
    ///
    /// Returns the first structural [`ProposalError`] found.
    pub fn check_structure(&self) -> Result<(), ProposalError> {
        if self.source.is_blank() {
            return Err(ProposalError::MissingSource);
        }
        if self.target.is_blank() {
            return Err(ProposalError::MissingTarget);
        }
        if self.source == self.target {
            return Err(ProposalError::SelfDelegation(self.source.clone()));
        }
        if self.capabilities.is_empty() {
            return Err(ProposalError::NoCapabilities);
        }
        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if !seen.insert(capability.uri()) {
                return Err(ProposalError::DuplicateCapability(capability.uri().to_owned()));
            }
            if let Some(raw) = capability.constraint_set().malformed().first() {
                return Err(ProposalError::MalformedConstraint {
                    capability: capability.uri().to_owned(),
                    raw: raw.clone(),
                });
            }
        }
        Ok(())
    }
}
