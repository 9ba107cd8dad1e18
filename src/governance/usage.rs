//! Governance usage classification.
//!
//! Classifies budget and request-rate consumption against configured limits
//! into nominal, near-limit, and over-limit bands. Every metric is evaluated
//! independently. The evaluator is stateless: it never mutates a snapshot
//! and never blocks anything itself. Blocking is up to an enforcement point
//! that consumes the emitted [`GovernanceSignal`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::UsageThresholds;
use crate::delegation::PrincipalId;

/// A governed usage dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMetric {
    /// Cost to date against the budget.
    Budget,
    /// Requests in the current minute.
    RequestsPerMinute,
    /// Requests in the current hour.
    RequestsPerHour,
    /// Requests in the current day.
    RequestsPerDay,
}

impl UsageMetric {
    /// Every metric, in report order.
    pub const ALL: [UsageMetric; 4] = [
        Self::Budget,
        Self::RequestsPerMinute,
        Self::RequestsPerHour,
        Self::RequestsPerDay,
    ];

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::RequestsPerMinute => "requests/minute",
            Self::RequestsPerHour => "requests/hour",
            Self::RequestsPerDay => "requests/day",
        }
    }
}

impl fmt::Display for UsageMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Usage band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// Comfortably within limits, or unbounded.
    Nominal,
    /// Approaching the limit.
    NearLimit,
    /// Past the over-limit threshold.
    OverLimit,
}

/// Result of classifying one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageClassification {
    /// Usage band.
    pub status: UsageStatus,
    /// `current / limit * 100`; 0 when unbounded. Not clamped.
    pub percentage: f64,
}

/// Configured limits. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageLimits {
    /// Budget ceiling in currency units.
    pub budget: Option<f64>,
    /// Requests allowed per minute.
    pub requests_per_minute: Option<u32>,
    /// Requests allowed per hour.
    pub requests_per_hour: Option<u32>,
    /// Requests allowed per day.
    pub requests_per_day: Option<u32>,
}

/// Point-in-time consumption for one principal, paired with its limits.
///
/// Supplied by an external metering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Principal the counters belong to.
    pub principal: PrincipalId,
    /// Cost accrued so far.
    #[serde(default)]
    pub cost_to_date: f64,
    /// Requests in the current minute.
    #[serde(default)]
    pub requests_per_minute: u32,
    /// Requests in the current hour.
    #[serde(default)]
    pub requests_per_hour: u32,
    /// Requests in the current day.
    #[serde(default)]
    pub requests_per_day: u32,
    /// Configured limits.
    #[serde(default)]
    pub limits: UsageLimits,
}

impl UsageSnapshot {
    /// Current value and limit for `metric`.
    pub fn reading(&self, metric: UsageMetric) -> (f64, Option<f64>) {
        match metric {
            UsageMetric::Budget => (self.cost_to_date, self.limits.budget),
            UsageMetric::RequestsPerMinute => (
                f64::from(self.requests_per_minute),
                self.limits.requests_per_minute.map(f64::from),
            ),
            UsageMetric::RequestsPerHour => (
                f64::from(self.requests_per_hour),
                self.limits.requests_per_hour.map(f64::from),
            ),
            UsageMetric::RequestsPerDay => (
                f64::from(self.requests_per_day),
                self.limits.requests_per_day.map(f64::from),
            ),
        }
    }
}

/// Severity of a governance signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSeverity {
    /// Informational: usage is near its limit.
    Advisory,
    /// Enforcement points should refuse further usage.
    Blocking,
}

/// A signal for alerting or enforcement, emitted for non-nominal metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceSignal {
    /// Metric that triggered the signal.
    pub metric: UsageMetric,
    /// How serious it is.
    pub severity: SignalSeverity,
    /// Human-readable summary.
    pub message: String,
}

/// One classified metric in a [`UsageReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUsage {
    /// Which metric.
    pub metric: UsageMetric,
    /// Current value.
    pub current: f64,
    /// Configured limit, if any.
    pub limit: Option<f64>,
    /// Classification.
    #[serde(flatten)]
    pub classification: UsageClassification,
}

/// Per-metric classification for one principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Principal the report covers.
    pub principal: PrincipalId,
    /// One entry per metric, in [`UsageMetric::ALL`] order.
    pub metrics: Vec<MetricUsage>,
    /// Signals for every metric that is not nominal.
    pub signals: Vec<GovernanceSignal>,
}

impl UsageReport {
    /// Classification for `metric`.
    pub fn metric(&self, metric: UsageMetric) -> Option<&MetricUsage> {
        self.metrics.iter().find(|m| m.metric == metric)
    }

    /// Whether any signal is blocking.
    pub fn has_blocking(&self) -> bool {
        self.signals
            .iter()
            .any(|s| s.severity == SignalSeverity::Blocking)
    }
}

/// Stateless usage classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct GovernanceEvaluator {
    thresholds: UsageThresholds,
}

impl GovernanceEvaluator {
    /// Create an evaluator with the given thresholds.
    pub fn new(thresholds: UsageThresholds) -> Self {
        Self { thresholds }
    }

    /// Configured thresholds.
    pub fn thresholds(&self) -> &UsageThresholds {
        &self.thresholds
    }

    /// Classify `current` against `limit` for `metric`.
    pub fn classify_usage(
        &self,
        metric: UsageMetric,
        current: f64,
        limit: Option<f64>,
    ) -> UsageClassification {
        classify(
            current,
            limit,
            self.thresholds.near_limit_percent,
            self.thresholds.over_limit_percent(metric),
        )
    }

    /// Classify every metric in `snapshot` and collect signals.
    pub fn evaluate(&self, snapshot: &UsageSnapshot) -> UsageReport {
        let mut metrics = Vec::with_capacity(UsageMetric::ALL.len());
        let mut signals = Vec::new();

        for metric in UsageMetric::ALL {
            let (current, limit) = snapshot.reading(metric);
            let classification = self.classify_usage(metric, current, limit);
            if let Some(signal) = signal_for(metric, current, limit, classification) {
                signals.push(signal);
            }
            metrics.push(MetricUsage {
                metric,
                current,
                limit,
                classification,
            });
        }

        UsageReport {
            principal: snapshot.principal.clone(),
            metrics,
            signals,
        }
    }
}

/// Classify `current` against `limit`.
///
/// Unbounded limits are nominal at 0%. A zero limit is over-limit at 100%
/// once anything has been consumed. Otherwise usage above
/// `over_limit_percent` is over-limit, usage in
/// `(near_limit_percent, over_limit_percent]` is near-limit, and anything
/// lower is nominal.
pub fn classify(
    current: f64,
    limit: Option<f64>,
    near_limit_percent: f64,
    over_limit_percent: f64,
) -> UsageClassification {
    let Some(limit) = limit else {
        return UsageClassification {
            status: UsageStatus::Nominal,
            percentage: 0.0,
        };
    };

    if limit <= 0.0 {
        let status = if current > 0.0 {
            UsageStatus::OverLimit
        } else {
            UsageStatus::Nominal
        };
        let percentage = if current > 0.0 { 100.0 } else { 0.0 };
        return UsageClassification { status, percentage };
    }

    let percentage = current * 100.0 / limit;
    let status = if percentage > over_limit_percent {
        UsageStatus::OverLimit
    } else if percentage > near_limit_percent {
        UsageStatus::NearLimit
    } else {
        UsageStatus::Nominal
    };

    UsageClassification { status, percentage }
}

fn signal_for(
    metric: UsageMetric,
    current: f64,
    limit: Option<f64>,
    classification: UsageClassification,
) -> Option<GovernanceSignal> {
    let limit = limit?;
    let (severity, verb) = match classification.status {
        UsageStatus::Nominal => return None,
        UsageStatus::NearLimit => (SignalSeverity::Advisory, "is nearing"),
        UsageStatus::OverLimit => (SignalSeverity::Blocking, "has exceeded"),
    };
    Some(GovernanceSignal {
        metric,
        severity,
        message: format!(
            "{metric} {verb} its limit: {current} of {limit} ({:.1}%)",
            classification.percentage
        ),
    })
}
