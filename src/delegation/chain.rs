//! Delegation chain assembly for inspection.
//!
//! A [`DelegationChain`] is an ordered root-to-leaf list of principals and
//! the envelope active at each hop, annotated with the dimensions each hop
//! narrowed or loosened. The builder only assembles; it does not enforce the
//! tightening invariant except when deriving hops from proposals via
//! [`DelegationChainBuilder::extend`]. Stored links that loosen their parent
//! are accepted and reported in [`ChainHop::loosened_dimensions`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::constraint::{tightest_bound, Constraint, ConstraintSet};
use super::envelope::{DelegationError, DelegationProposal, Envelope, PrincipalId};

/// Maximum number of hops accepted when assembling a chain.
pub const MAX_CHAIN_HOPS: usize = 100;

/// Errors assembling a chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// No links were supplied.
    #[error("delegation chain is empty")]
    Empty,
    /// A link was not delegated by the previous principal.
    #[error("link for {principal} names delegator {found:?}, expected {expected}")]
    Discontinuous {
        /// Principal of the offending link.
        principal: PrincipalId,
        /// Leaf principal before this link.
        expected: PrincipalId,
        /// Delegator recorded on the link.
        found: Option<PrincipalId>,
    },
    /// A proposal's source is not the current leaf.
    #[error("proposal source {source_id} is not the chain leaf {leaf}")]
    NotLeaf {
        /// Source named by the proposal.
        source_id: PrincipalId,
        /// Current leaf principal.
        leaf: PrincipalId,
    },
    /// Deriving a hop from a proposal failed.
    #[error("delegation to {target} failed: {source}")]
    Delegation {
        /// Target of the failed proposal.
        target: PrincipalId,
        /// Underlying failure.
        source: DelegationError,
    },
    /// The chain grew past [`MAX_CHAIN_HOPS`].
    #[error("delegation chain exceeds {MAX_CHAIN_HOPS} hops")]
    TooLong,
}

/// A stored link as handed over by a trust-chain store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Principal holding `envelope`.
    pub principal: PrincipalId,
    /// Who delegated to `principal`; `None` for a root authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_by: Option<PrincipalId>,
    /// Envelope held by `principal`.
    pub envelope: Envelope,
}

/// One principal in an assembled chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainHop {
    /// Principal at this hop.
    pub principal: PrincipalId,
    /// Delegator; `None` at the root.
    pub delegated_by: Option<PrincipalId>,
    /// Envelope active at this hop.
    pub envelope: Envelope,
    /// Dimensions restricted relative to the previous hop.
    pub narrowed_dimensions: Vec<String>,
    /// Dimensions relaxed or dropped relative to the previous hop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loosened_dimensions: Vec<String>,
    /// Reason recorded on the proposal that created this hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// An ordered root-to-leaf delegation chain. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationChain {
    hops: Vec<ChainHop>,
}

impl DelegationChain {
    /// All hops, root first.
    pub fn hops(&self) -> &[ChainHop] {
        &self.hops
    }

    /// The root authority.
    pub fn root(&self) -> Option<&ChainHop> {
        self.hops.first()
    }

    /// The most recently delegated principal.
    pub fn leaf(&self) -> Option<&ChainHop> {
        self.hops.last()
    }

    /// Number of delegations (hops after the root).
    pub fn depth(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    /// Principals from root to leaf.
    pub fn principals(&self) -> Vec<&PrincipalId> {
        self.hops.iter().map(|h| &h.principal).collect()
    }

    /// Whether any hop narrowed its parent.
    pub fn has_narrowing(&self) -> bool {
        self.hops.iter().any(|h| !h.narrowed_dimensions.is_empty())
    }

    /// Whether any hop relaxed or dropped a restriction held by its parent.
    pub fn has_loosening(&self) -> bool {
        self.hops.iter().any(|h| !h.loosened_dimensions.is_empty())
    }

    /// Every narrowed dimension across the chain, sorted and deduplicated.
    pub fn all_narrowed_dimensions(&self) -> Vec<&str> {
        let mut dims: Vec<&str> = self
            .hops
            .iter()
            .flat_map(|h| h.narrowed_dimensions.iter().map(String::as_str))
            .collect();
        dims.sort_unstable();
        dims.dedup();
        dims
    }
}

/// Builds a [`DelegationChain`] from a root outward.
#[derive(Debug, Clone)]
pub struct DelegationChainBuilder {
    hops: Vec<ChainHop>,
}

impl DelegationChainBuilder {
    /// Start a chain at a root authority.
    pub fn new(root: impl Into<PrincipalId>, envelope: Envelope) -> Self {
        Self {
            hops: vec![ChainHop {
                principal: root.into(),
                delegated_by: None,
                envelope,
                narrowed_dimensions: Vec::new(),
                loosened_dimensions: Vec::new(),
                justification: None,
            }],
        }
    }

    /// Assemble a chain from stored links, root first.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Empty`], [`ChainError::TooLong`], or
    /// [`ChainError::Discontinuous`] when a link's delegator is not the
    /// previous principal.
    pub fn from_links(links: Vec<ChainLink>) -> Result<DelegationChain, ChainError> {
        if links.len() > MAX_CHAIN_HOPS {
            return Err(ChainError::TooLong);
        }
        let mut links = links.into_iter();
        let root = links.next().ok_or(ChainError::Empty)?;
        let mut builder = Self {
            hops: vec![ChainHop {
                principal: root.principal,
                delegated_by: root.delegated_by,
                envelope: root.envelope,
                narrowed_dimensions: Vec::new(),
                loosened_dimensions: Vec::new(),
                justification: None,
            }],
        };

        for link in links {
            let expected = builder.leaf_principal().clone();
            if link.delegated_by.as_ref() != Some(&expected) {
                return Err(ChainError::Discontinuous {
                    principal: link.principal,
                    expected,
                    found: link.delegated_by,
                });
            }
            builder = builder.push(link.principal, link.envelope)?;
        }

        Ok(builder.build())
    }

    /// Append an already-established hop delegated by the current leaf.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::TooLong`] past [`MAX_CHAIN_HOPS`].
    pub fn push(
        mut self,
        principal: impl Into<PrincipalId>,
        envelope: Envelope,
    ) -> Result<Self, ChainError> {
        self.append(principal.into(), envelope, None)?;
        Ok(self)
    }

    /// Validate `proposal` against the current leaf and append the derived
    /// child.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NotLeaf`] when the proposal's source is not the
    /// leaf, or [`ChainError::Delegation`] when the proposal is invalid or
    /// rejected.
    pub fn extend(mut self, proposal: &DelegationProposal) -> Result<Self, ChainError> {
        let leaf = self.leaf_hop();
        if proposal.source != leaf.principal {
            return Err(ChainError::NotLeaf {
                source_id: proposal.source.clone(),
                leaf: leaf.principal.clone(),
            });
        }
        let child = leaf
            .envelope
            .delegate(proposal)
            .map_err(|source| ChainError::Delegation {
                target: proposal.target.clone(),
                source,
            })?;
        self.append(
            proposal.target.clone(),
            child,
            proposal.justification.clone(),
        )?;
        Ok(self)
    }

    /// Finish the chain.
    pub fn build(self) -> DelegationChain {
        DelegationChain { hops: self.hops }
    }

    fn append(
        &mut self,
        principal: PrincipalId,
        envelope: Envelope,
        justification: Option<String>,
    ) -> Result<(), ChainError> {
        if self.hops.len() >= MAX_CHAIN_HOPS {
            return Err(ChainError::TooLong);
        }
        let parent = self.leaf_hop();
        let changes = compare_envelopes(&parent.envelope, &envelope);
        let hop = ChainHop {
            narrowed_dimensions: changes.narrowed,
            loosened_dimensions: changes.loosened,
            delegated_by: Some(parent.principal.clone()),
            principal,
            envelope,
            justification,
        };
        self.hops.push(hop);
        Ok(())
    }

    fn leaf_hop(&self) -> &ChainHop {
        // `hops` starts with the root and only grows.
        &self.hops[self.hops.len().saturating_sub(1)]
    }

    fn leaf_principal(&self) -> &PrincipalId {
        &self.leaf_hop().principal
    }
}

/// Dimensions a child envelope changed relative to its parent, split by
/// direction. Both lists are sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeChanges {
    /// Restrictions the child tightened or added.
    pub narrowed: Vec<String>,
    /// Restrictions the child relaxed or dropped.
    pub loosened: Vec<String>,
}

/// Dimensions along which `child` is tighter than `parent`, including
/// capabilities it no longer holds and restrictions it adds.
pub fn narrowed_dimensions(parent: &Envelope, child: &Envelope) -> Vec<String> {
    compare_envelopes(parent, child).narrowed
}

/// Dimensions along which `child` is looser than `parent`, including parent
/// restrictions it dropped and capabilities the parent never held.
pub fn loosened_dimensions(parent: &Envelope, child: &Envelope) -> Vec<String> {
    compare_envelopes(parent, child).loosened
}

/// Classify every difference between `parent` and `child` by direction.
pub fn compare_envelopes(parent: &Envelope, child: &Envelope) -> EnvelopeChanges {
    let mut changes = EnvelopeChanges::default();

    compare_constraints(
        parent.constraint_set(),
        child.constraint_set(),
        None,
        &mut changes,
    );

    for held in parent.capabilities() {
        match child.capability(held.uri()) {
            None => changes.narrowed.push(format!("capability:{}", held.uri())),
            Some(granted) => compare_constraints(
                held.constraint_set(),
                granted.constraint_set(),
                Some(held.uri()),
                &mut changes,
            ),
        }
    }
    for granted in child.capabilities() {
        if parent.capability(granted.uri()).is_none() {
            changes.loosened.push(format!("capability:{}", granted.uri()));
        }
    }

    match child.remaining_depth().cmp(&parent.remaining_depth()) {
        Ordering::Less => changes.narrowed.push("delegation_depth".to_owned()),
        Ordering::Greater => changes.loosened.push("delegation_depth".to_owned()),
        Ordering::Equal => {}
    }
    match (parent.allow_further_delegation(), child.allow_further_delegation()) {
        (true, false) => changes.narrowed.push("allow_further_delegation".to_owned()),
        (false, true) => changes.loosened.push("allow_further_delegation".to_owned()),
        _ => {}
    }
    match (parent.expires_at(), child.expires_at()) {
        (None, Some(_)) => changes.narrowed.push("expires_at".to_owned()),
        (Some(_), None) => changes.loosened.push("expires_at".to_owned()),
        (Some(p), Some(c)) if c < p => changes.narrowed.push("expires_at".to_owned()),
        (Some(p), Some(c)) if c > p => changes.loosened.push("expires_at".to_owned()),
        _ => {}
    }

    for dims in [&mut changes.narrowed, &mut changes.loosened] {
        dims.sort_unstable();
        dims.dedup();
    }
    changes
}

/// Compare one constraint set against its parent's.
///
/// A child constraint is narrowing when it is tighter than the parent's
/// tightest comparable bound or when nothing in the parent compares with it.
/// A parent constraint is dropped when the child keeps neither the exact
/// entry nor a numeric entry on the same dimension and unit.
fn compare_constraints(
    parent: &ConstraintSet,
    child: &ConstraintSet,
    capability: Option<&str>,
    changes: &mut EnvelopeChanges,
) {
    let label = |c: &Constraint| match capability {
        Some(uri) => format!("{uri}/{}", c.dimension()),
        None => c.dimension(),
    };

    for constraint in child.constraints() {
        if parent.constraints().contains(constraint) {
            continue;
        }
        let direction = tightest_bound(parent.constraints(), constraint)
            .and_then(|bound| constraint.tightness(bound));
        match direction {
            None | Some(Ordering::Greater) => changes.narrowed.push(label(constraint)),
            Some(Ordering::Less) => changes.loosened.push(label(constraint)),
            Some(Ordering::Equal) => {}
        }
    }

    for held in parent.constraints() {
        let kept = child.constraints().iter().any(|c| {
            c == held || (c.same_dimension(held) && c.value().same_unit(held.value()))
        });
        if !kept {
            changes.loosened.push(label(held));
        }
    }
}
