//! Governance: usage classification against budget and rate limits.

pub mod usage;

pub use usage::{
    classify, GovernanceEvaluator, GovernanceSignal, MetricUsage, SignalSeverity,
    UsageClassification, UsageLimits, UsageMetric, UsageReport, UsageSnapshot, UsageStatus,
};
