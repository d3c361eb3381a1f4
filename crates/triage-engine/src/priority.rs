//! # Priority Calculator
//!
//! Turns a triage level and a wait signal into the integer score that orders the
//! waiting list. The score is the triage base weight plus a linear wait bonus:
//!
//! ```text
//! score = base_weight(triage) + min(wait_minutes * 2, 200)
//!
//!   immediate   1000 ┤████████████████████
//!   urgent       500 ┤██████████
//!   semi_urgent  200 ┤████
//!   non_urgent    50 ┤█
//!   wait bonus  ≤200 ┤████
//! ```
//!
//! The bonus cap keeps the tiers apart: a non_urgent patient who has waited
//! forever scores at most 250, far below an immediate patient at 1000.
//!
//! Scores are not refreshed as time passes. They are computed at check-in (wait
//! of zero) and again only when an update actually changes the triage level.
//! Listing order breaks equal scores by check-in time, earliest first, which
//! makes up for the stale wait signal within a tier.
//!
//! ## Example
//!
//! ```rust
//! use triage_engine::priority::compute_priority;
//! use triage_engine::types::TriageLevel;
//!
//! assert_eq!(compute_priority(TriageLevel::NonUrgent, 0), 50);
//! assert_eq!(compute_priority(TriageLevel::Urgent, 30), 560);
//! assert_eq!(compute_priority(TriageLevel::SemiUrgent, 500), 400);
//! ```

use std::cmp::Ordering;

use crate::types::{QueueEntry, TriageLevel};

pub const IMMEDIATE_WEIGHT: i64 = 1000;
pub const URGENT_WEIGHT: i64 = 500;
pub const SEMI_URGENT_WEIGHT: i64 = 200;
pub const NON_URGENT_WEIGHT: i64 = 50;

/// Bonus points per minute waited
pub const WAIT_BONUS_PER_MINUTE: i64 = 2;

/// Upper bound of the wait bonus
pub const MAX_WAIT_BONUS: i64 = 200;

/// Base weight of a triage level
///
/// Labels outside the four levels never get this far: they fail to parse as
/// [`TriageLevel`] and the request is rejected as invalid.
pub fn base_weight(level: TriageLevel) -> i64 {
    match level {
        TriageLevel::Immediate => IMMEDIATE_WEIGHT,
        TriageLevel::Urgent => URGENT_WEIGHT,
        TriageLevel::SemiUrgent => SEMI_URGENT_WEIGHT,
        TriageLevel::NonUrgent => NON_URGENT_WEIGHT,
    }
}

/// Linear wait bonus, capped. Negative waits count as zero.
pub fn wait_bonus(wait_minutes: i64) -> i64 {
    wait_minutes
        .max(0)
        .saturating_mul(WAIT_BONUS_PER_MINUTE)
        .min(MAX_WAIT_BONUS)
}

/// Priority score for a triage level after `wait_minutes` of waiting
pub fn compute_priority(level: TriageLevel, wait_minutes: i64) -> i64 {
    base_weight(level) + wait_bonus(wait_minutes)
}

/// Listing order: priority descending, then check-in ascending, then id
pub fn queue_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.priority_score
        .cmp(&a.priority_score)
        .then_with(|| a.check_in_time.cmp(&b.check_in_time))
        .then_with(|| a.id.cmp(&b.id))
}
