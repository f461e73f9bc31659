use chrono::{DateTime, Utc};

use crate::UnitError;

pub const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_DAY: i64 = 86_400 * 1_000 * NANOS_PER_MILLI;

/// Wire ns to a calendar time, floored to whole milliseconds.
pub fn to_calendar_time(ns: i64) -> Result<DateTime<Utc>, UnitError> {
    let millis = ns.div_euclid(NANOS_PER_MILLI);
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or(UnitError::TimeOutOfRange(ns))
}

/// Calendar time to wire ns. Precision below one millisecond is dropped, so
/// `to_wire_time(to_calendar_time(x)?) == x` only for whole-millisecond `x`.
pub fn to_wire_time(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis().saturating_mul(NANOS_PER_MILLI)
}

/// Whole nights between two wire timestamps, rounded up; zero when
/// `check_out <= check_in`.
pub fn nights_between(check_in: i64, check_out: i64) -> i64 {
    let span = check_out.saturating_sub(check_in);
    if span <= 0 {
        return 0;
    }
    (span - 1) / NANOS_PER_DAY + 1
}
