//! Typed constraints parsed from the `kind:field:value` wire form.
//!
//! A [`Constraint`] is parsed once at the boundary and carried as a typed
//! value from then on. Numeric values keep their original text so that
//! [`serialize_constraint`] reproduces the input exactly.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Numeric value pattern: optional currency symbol, digits with optional
/// thousands separators and fraction, optional period suffix.
static NUMERIC_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[$€£¥]?\s*([+-]?\d+(?:,\d{3})*(?:\.\d+)?)\s*(?:/(day|hour|week))?$").ok()
});

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while parsing a raw constraint string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    /// The raw text is not a well-formed `kind:field:value` triple.
    #[error("malformed constraint '{raw}': {reason}")]
    MalformedConstraint {
        /// The offending input.
        raw: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// The closed set of restriction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Upper bound on a consumable resource (cost, tokens, storage).
    ResourceLimit,
    /// Upper bound on a request rate.
    RateLimit,
    /// Window of time during which the capability may be used.
    TimeWindow,
    /// Restricts which data the capability may touch.
    DataScope,
    /// Restricts which actions may be performed.
    ActionRestriction,
    /// Requires audit records for usage.
    AuditRequirement,
}

impl ConstraintKind {
    /// Wire token for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResourceLimit => "resource_limit",
            Self::RateLimit => "rate_limit",
            Self::TimeWindow => "time_window",
            Self::DataScope => "data_scope",
            Self::ActionRestriction => "action_restriction",
            Self::AuditRequirement => "audit_requirement",
        }
    }

    /// Parse a wire token into a kind.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "resource_limit" => Some(Self::ResourceLimit),
            "rate_limit" => Some(Self::RateLimit),
            "time_window" => Some(Self::TimeWindow),
            "data_scope" => Some(Self::DataScope),
            "action_restriction" => Some(Self::ActionRestriction),
            "audit_requirement" => Some(Self::AuditRequirement),
            _ => None,
        }
    }

    /// Whether a larger value is the tighter restriction for this kind.
    ///
    /// No kind in the current set is a minimum bound; every numeric kind
    /// tightens downward.
    pub fn is_minimum_bound(self) -> bool {
        match self {
            Self::ResourceLimit
            | Self::RateLimit
            | Self::TimeWindow
            | Self::DataScope
            | Self::ActionRestriction
            | Self::AuditRequirement => false,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Period a rate is measured over, from a `/hour`, `/day` or `/week` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatePeriod {
    /// `/hour`
    Hour,
    /// `/day`
    Day,
    /// `/week`
    Week,
}

impl RatePeriod {
    /// Suffix token without the leading `/`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }

    /// Length of the period in hours.
    pub fn hours(self) -> f64 {
        match self {
            Self::Hour => 1.0,
            Self::Day => 24.0,
            Self::Week => 168.0,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            _ => None,
        }
    }
}

impl fmt::Display for RatePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constraint value: numeric when it parses as one, opaque otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    /// Magnitude-comparable value.
    Numeric {
        /// Parsed magnitude with currency symbol and period suffix removed.
        amount: f64,
        /// Period the amount is measured over, when a suffix was present.
        period: Option<RatePeriod>,
        /// Original text, kept for exact serialization.
        raw: String,
    },
    /// Value only usable for presence and equality checks.
    Opaque(String),
}

impl ConstraintValue {
    /// Classify a raw value string.
    pub fn parse(raw: &str) -> Self {
        match extract_numeric(raw) {
            Some((amount, period)) => Self::Numeric {
                amount,
                period,
                raw: raw.to_owned(),
            },
            None => Self::Opaque(raw.to_owned()),
        }
    }

    /// The magnitude, if this value is numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric { amount, .. } => Some(*amount),
            Self::Opaque(_) => None,
        }
    }

    /// The rate period, if this value is numeric and carried a suffix.
    pub fn period(&self) -> Option<RatePeriod> {
        match self {
            Self::Numeric { period, .. } => *period,
            Self::Opaque(_) => None,
        }
    }

    /// Whether both values are numeric and measured over the same period
    /// (or both over none).
    pub fn same_unit(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Numeric { period: a, .. }, Self::Numeric { period: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Magnitudes of `self` and `other` in a common unit.
    ///
    /// Rates over different periods are converted to per-hour amounts. A
    /// rate and a plain amount measure different things and yield `None`,
    /// as does any opaque value.
    pub fn comparable_amounts(&self, other: &Self) -> Option<(f64, f64)> {
        match (self, other) {
            (
                Self::Numeric {
                    amount: mine,
                    period: my_period,
                    ..
                },
                Self::Numeric {
                    amount: theirs,
                    period: their_period,
                    ..
                },
            ) => match (my_period, their_period) {
                (None, None) => Some((*mine, *theirs)),
                (Some(a), Some(b)) => Some((mine / a.hours(), theirs / b.hours())),
                _ => None,
            },
            _ => None,
        }
    }

    /// The original text of the value.
    pub fn raw(&self) -> &str {
        match self {
            Self::Numeric { raw, .. } | Self::Opaque(raw) => raw,
        }
    }
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// Strip currency symbols and thousands separators, then parse what remains
/// as a finite number. The period suffix, if any, is returned alongside.
fn extract_numeric(raw: &str) -> Option<(f64, Option<RatePeriod>)> {
    let pattern = NUMERIC_VALUE.as_ref()?;
    let captures = pattern.captures(raw.trim())?;
    let digits = captures.get(1)?.as_str().replace(',', "");
    let amount = digits.parse::<f64>().ok().filter(|n| n.is_finite())?;
    let period = captures
        .get(2)
        .and_then(|suffix| RatePeriod::from_suffix(suffix.as_str()));
    Some((amount, period))
}

// ---------------------------------------------------------------------------
// Constraint
// ---------------------------------------------------------------------------

/// A typed `(kind, field, value)` restriction.
///
/// Immutable once created; edits produce a new constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    kind: ConstraintKind,
    field: String,
    value: ConstraintValue,
}

impl Constraint {
    /// Restriction kind.
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// Dimension being restricted.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Restriction value.
    pub fn value(&self) -> &ConstraintValue {
        &self.value
    }

    /// `kind:field` key used to pair parent and child constraints.
    pub fn dimension(&self) -> String {
        format!("{}:{}", self.kind, self.field)
    }

    /// Whether `other` restricts the same `(kind, field)` dimension.
    pub fn same_dimension(&self, other: &Constraint) -> bool {
        self.kind == other.kind && self.field == other.field
    }

    /// How restrictive `self` is relative to `bound`.
    ///
    /// `Greater` means `self` is tighter, `Less` means looser. `None` when the
    /// two restrict different dimensions or their values cannot be compared
    /// by magnitude.
    pub fn tightness(&self, bound: &Constraint) -> Option<Ordering> {
        if !self.same_dimension(bound) {
            return None;
        }
        let (mine, theirs) = self.value.comparable_amounts(&bound.value)?;
        let order = mine.partial_cmp(&theirs)?;
        Some(if self.kind.is_minimum_bound() {
            order
        } else {
            order.reverse()
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.field, self.value)
    }
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_constraint(s)
    }
}

impl TryFrom<String> for Constraint {
    type Error = ConstraintError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        parse_constraint(&raw)
    }
}

impl From<Constraint> for String {
    fn from(constraint: Constraint) -> Self {
        serialize_constraint(&constraint)
    }
}

/// Parse a raw `kind:field:value` string.
///
/// Everything after the second `:` is the value, so values may themselves
/// contain colons.
///
/// # Errors
///
/// Returns [`ConstraintError::MalformedConstraint`] when fewer than three
/// parts exist, the kind is unknown, or the field or value is empty.
pub fn parse_constraint(raw: &str) -> Result<Constraint, ConstraintError> {
    let malformed = |reason| ConstraintError::MalformedConstraint {
        raw: raw.to_owned(),
        reason,
    };

    let mut parts = raw.splitn(3, ':');
    let (Some(kind), Some(field), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed("expected kind:field:value"));
    };

    let kind = ConstraintKind::from_token(kind).ok_or_else(|| malformed("unknown kind"))?;
    if field.is_empty() {
        return Err(malformed("empty field"));
    }
    if value.is_empty() {
        return Err(malformed("empty value"));
    }

    Ok(Constraint {
        kind,
        field: field.to_owned(),
        value: ConstraintValue::parse(value),
    })
}

/// The most restrictive of `candidates` that can be compared with `constraint`.
pub fn tightest_bound<'a, I>(candidates: I, constraint: &Constraint) -> Option<&'a Constraint>
where
    I: IntoIterator<Item = &'a Constraint>,
{
    candidates
        .into_iter()
        .filter(|c| constraint.tightness(c).is_some())
        .reduce(|best, next| {
            if next.tightness(best) == Some(Ordering::Greater) {
                next
            } else {
                best
            }
        })
}

/// Serialize a constraint back to its `kind:field:value` form.
pub fn serialize_constraint(constraint: &Constraint) -> String {
    constraint.to_string()
}

// ---------------------------------------------------------------------------
// Constraint set
// ---------------------------------------------------------------------------

/// Constraints as held in an envelope or capability.
///
/// Stored at rest as raw strings. Entries that fail to parse are kept aside
/// as inert text: they never take part in comparisons and never raise a
/// violation, but they are preserved on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ConstraintSet {
    parsed: Vec<Constraint>,
    malformed: Vec<String>,
}

impl ConstraintSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw strings, setting malformed entries aside.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for entry in raw {
            let entry = entry.as_ref();
            match parse_constraint(entry) {
                Ok(constraint) => set.parsed.push(constraint),
                Err(e) => {
                    tracing::debug!(error = %e, "keeping malformed constraint as inert");
                    set.malformed.push(entry.to_owned());
                }
            }
        }
        set
    }

    /// Well-formed constraints, in insertion order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.parsed
    }

    /// Raw entries that failed to parse.
    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }

    /// Find the constraint restricting the same dimension as `other`.
    pub fn find_matching(&self, other: &Constraint) -> Option<&Constraint> {
        self.parsed.iter().find(|c| c.same_dimension(other))
    }

    /// Whether no well-formed or malformed entries are held.
    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty() && self.malformed.is_empty()
    }

    /// Return a new set with `overrides` layered on top.
    ///
    /// A numeric override replaces a numeric entry on the same dimension and
    /// unit, so `50/day` replaces `100/day` but `10/hour` sits alongside it.
    /// Any other override is appended, so opaque restrictions accumulate
    /// instead of replacing one another. Exact duplicates are skipped.
    pub fn overlay<'a, I>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = &'a Constraint>,
    {
        let mut merged = self.clone();
        for constraint in overrides {
            if merged.parsed.contains(constraint) {
                continue;
            }
            let numeric_slot = merged.parsed.iter_mut().find(|existing| {
                existing.same_dimension(constraint) && existing.value.same_unit(&constraint.value)
            });
            match numeric_slot {
                Some(slot) => *slot = constraint.clone(),
                None => merged.parsed.push(constraint.clone()),
            }
        }
        merged
    }
}

impl FromIterator<Constraint> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = Constraint>>(iter: I) -> Self {
        Self {
            parsed: iter.into_iter().collect(),
            malformed: Vec::new(),
        }
    }
}

impl From<Vec<String>> for ConstraintSet {
    fn from(raw: Vec<String>) -> Self {
        Self::from_raw(raw)
    }
}

impl From<ConstraintSet> for Vec<String> {
    fn from(set: ConstraintSet) -> Self {
        set.parsed
            .iter()
            .map(serialize_constraint)
            .chain(set.malformed)
            .collect()
    }
}
