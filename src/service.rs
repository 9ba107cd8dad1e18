//! Caller-facing entry points.
//!
//! [`GovernanceService`] pairs a [`TrustChainStore`] with a
//! [`GovernanceEvaluator`]. Fetches from the store are the only suspension
//! points; validation and classification are pure and run inline.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::delegation::{
    self, ChainError, Constraint, ConstraintError, DelegationChain, DelegationChainBuilder,
    DelegationError, DelegationProposal, Envelope, PrincipalId, ProposalError, ViolationReport,
};
use crate::governance::{
    GovernanceEvaluator, SignalSeverity, UsageClassification, UsageMetric, UsageReport,
};
use crate::store::{StoreError, TrustChainStore};

/// Errors surfaced by [`GovernanceService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The trust-chain store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The proposal is structurally invalid.
    #[error(transparent)]
    Proposal(#[from] ProposalError),

    /// The proposal was validated and rejected.
    #[error("delegation rejected with {} violation(s)", .0.len())]
    Rejected(ViolationReport),

    /// The stored chain could not be assembled.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl From<DelegationError> for ServiceError {
    fn from(err: DelegationError) -> Self {
        match err {
            DelegationError::Invalid(e) => Self::Proposal(e),
            DelegationError::Rejected(report) => Self::Rejected(report),
        }
    }
}

/// Delegation validation and usage classification over a trust-chain store.
pub struct GovernanceService<S> {
    store: Arc<S>,
    evaluator: GovernanceEvaluator,
}

impl<S> std::fmt::Debug for GovernanceService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceService")
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

impl<S: TrustChainStore> GovernanceService<S> {
    /// Create a service over `store`.
    pub fn new(store: Arc<S>, evaluator: GovernanceEvaluator) -> Self {
        Self { store, evaluator }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate `proposal` against an already-fetched parent envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError`] when the proposal is structurally invalid.
    pub fn validate_delegation(
        &self,
        parent: &Envelope,
        proposal: &DelegationProposal,
    ) -> Result<ViolationReport, ProposalError> {
        let report = delegation::validate(parent, proposal)?;
        if report.is_valid() {
            debug!(
                source = %proposal.source,
                target = %proposal.target,
                capabilities = proposal.capabilities.len(),
                "delegation proposal valid"
            );
        } else {
            info!(
                source = %proposal.source,
                target = %proposal.target,
                violations = report.len(),
                "delegation proposal rejected"
            );
        }
        Ok(report)
    }

    /// Fetch the source's envelope and validate `proposal` against it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the envelope cannot be fetched or
    /// [`ServiceError::Proposal`] for structural problems.
    pub async fn validate_for_source(
        &self,
        proposal: &DelegationProposal,
    ) -> Result<ViolationReport, ServiceError> {
        proposal.check_structure()?;
        let parent = self.store.get_envelope(&proposal.source).await?;
        Ok(self.validate_delegation(&parent, proposal)?)
    }

    /// Fetch the source's envelope and derive the child envelope.
    ///
    /// The child is returned, not stored; persisting it belongs to the
    /// store's owner.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Rejected`] with the full report when the
    /// proposal loosens the source's envelope.
    pub async fn delegate(&self, proposal: &DelegationProposal) -> Result<Envelope, ServiceError> {
        proposal.check_structure()?;
        let parent = self.store.get_envelope(&proposal.source).await?;
        let child = parent.delegate(proposal)?;
        info!(
            source = %proposal.source,
            target = %proposal.target,
            remaining_depth = child.remaining_depth(),
            "delegation accepted"
        );
        Ok(child)
    }

    /// Classify a single reading.
    pub fn classify_usage(
        &self,
        metric: UsageMetric,
        current: f64,
        limit: Option<f64>,
    ) -> UsageClassification {
        self.evaluator.classify_usage(metric, current, limit)
    }

    /// Fetch `principal`'s usage snapshot and classify every metric.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the snapshot cannot be fetched.
    pub async fn evaluate_usage(&self, principal: &PrincipalId) -> Result<UsageReport, ServiceError> {
        let snapshot = self.store.get_usage_snapshot(principal).await?;
        let report = self.evaluator.evaluate(&snapshot);
        for signal in &report.signals {
            match signal.severity {
                SignalSeverity::Blocking => warn!(
                    principal = %principal,
                    metric = %signal.metric,
                    "{}",
                    signal.message
                ),
                SignalSeverity::Advisory => info!(
                    principal = %principal,
                    metric = %signal.metric,
                    "{}",
                    signal.message
                ),
            }
        }
        Ok(report)
    }

    /// Fetch and assemble the delegation chain ending at `principal`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] or [`ServiceError::Chain`].
    pub async fn chain_for(&self, principal: &PrincipalId) -> Result<DelegationChain, ServiceError> {
        let links = self.store.get_chain(principal).await?;
        let chain = DelegationChainBuilder::from_links(links)?;
        if chain.has_loosening() {
            warn!(
                principal = %principal,
                depth = chain.depth(),
                "stored delegation chain loosens a parent restriction"
            );
        } else {
            debug!(principal = %principal, depth = chain.depth(), "delegation chain assembled");
        }
        Ok(chain)
    }

    /// Parse a raw constraint string.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::MalformedConstraint`] for malformed input.
    pub fn parse_constraint(&self, raw: &str) -> Result<Constraint, ConstraintError> {
        delegation::parse_constraint(raw)
    }

    /// Serialize a constraint to its wire form.
    pub fn serialize_constraint(&self, constraint: &Constraint) -> String {
        delegation::serialize_constraint(constraint)
    }
}
