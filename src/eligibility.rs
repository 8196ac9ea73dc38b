//! Upload eligibility of a dated unit.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Grace period used when none is configured: units become eligible at
/// 01:00 on the day after their date.
pub fn default_grace_period() -> Duration {
    Duration::hours(1)
}

/// Instant at which a unit dated `date` becomes eligible for upload.
pub fn eligible_from(date: NaiveDate, grace_period: Duration) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::days(1))?
        .checked_add_signed(grace_period)
}

/// `true` iff `now >= date + 1 day + grace_period`.
///
/// Dates too close to the end of the calendar to compute a deadline are
/// never eligible.
pub fn is_eligible(date: NaiveDate, now: NaiveDateTime, grace_period: Duration) -> bool {
    eligible_from(date, grace_period).is_some_and(|from| now >= from)
}
