//! Trust delegation: constraints, capabilities, envelopes, the tightening
//! validator, depth tracking, and chain assembly.
//!
//! Everything here is pure and synchronous. Envelopes are immutable values;
//! delegation derives a new child envelope and never alters the parent.

pub mod capability;
pub mod chain;
pub mod constraint;
pub mod depth;
pub mod envelope;
pub mod validator;

pub use capability::{Capability, CapabilityKind};
pub use chain::{
    ChainError, ChainHop, ChainLink, DelegationChain, DelegationChainBuilder, EnvelopeChanges,
};
pub use constraint::{
    parse_constraint, serialize_constraint, Constraint, ConstraintError, ConstraintKind,
    ConstraintSet, ConstraintValue, RatePeriod,
};
pub use envelope::{
    DelegationError, DelegationProposal, Envelope, EnvelopeError, EnvelopeRecord, PrincipalId,
    ProposalError,
};
pub use validator::{validate, Violation, ViolationKind, ViolationReport};
