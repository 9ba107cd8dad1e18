//! Trust delegation and governance validation engine.
//!
//! Decides whether one principal may delegate a subset of its capabilities
//! to another, under what constraints and to what depth, and classifies
//! ongoing budget and rate usage against governance limits.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod delegation;
pub mod governance;
pub mod logging;
pub mod service;
pub mod store;

pub use delegation::{
    parse_constraint, serialize_constraint, validate as validate_delegation, Capability,
    CapabilityKind, Constraint, ConstraintKind, DelegationProposal, Envelope, PrincipalId,
    Violation, ViolationKind, ViolationReport,
};
pub use governance::{GovernanceEvaluator, UsageMetric, UsageSnapshot, UsageStatus};
pub use service::{GovernanceService, ServiceError};
pub use store::{InMemoryTrustStore, StoreError, TrustChainStore};
