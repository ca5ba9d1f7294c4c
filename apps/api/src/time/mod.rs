//! Interval arithmetic over half-open time intervals.
//!
//! Everything the scheduler decides rests on `overlaps` being exact at the
//! boundaries: an event ending at 16:00 does NOT conflict with one starting
//! at 16:00.

use chrono::{DateTime, Duration, Utc};

/// True iff `[a_start, a_end)` and `[b_start, b_end)` share at least one instant.
///
/// Half-open semantics: adjacent intervals (`a_end == b_start`) do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Returns `t + n` minutes.
pub fn add_minutes(t: DateTime<Utc>, n: i64) -> DateTime<Utc> {
    t + Duration::minutes(n)
}

/// Advances `t` by one search step.
pub fn step_forward(t: DateTime<Utc>, step_minutes: i64) -> DateTime<Utc> {
    add_minutes(t, step_minutes)
}
