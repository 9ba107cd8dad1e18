//! Delegation depth tracking.
//!
//! Depth is the number of further re-delegation hops a grant may travel.
//! A child receives exactly the depth it requested; the validator rejects
//! requests above the parent's remaining depth before this is consulted.

/// Remaining depth for a child envelope.
///
/// Clamped to `parent_remaining` so an unvalidated request can never widen
/// the bound.
pub fn next_depth(parent_remaining: u32, requested: u32) -> u32 {
    requested.min(parent_remaining)
}

/// Whether `requested` exceeds what the parent may hand on.
pub fn exceeds(parent_remaining: u32, requested: u32) -> bool {
    requested > parent_remaining
}

/// Whether an envelope with this remaining depth is terminal.
pub fn is_terminal(remaining: u32) -> bool {
    remaining == 0
}

/// Effective further-delegation flag for an envelope at `remaining` depth.
///
/// A terminal envelope may never allow further delegation.
pub fn allows_further(remaining: u32, requested_flag: bool) -> bool {
    requested_flag && !is_terminal(remaining)
}
