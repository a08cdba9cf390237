//! Wall-clock helpers.
//!
//! Uses `std::time::SystemTime` to avoid pulling in `chrono`. All calendar
//! computations are UTC.

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Current Unix time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Format a Unix-millisecond instant as `yyyyMMdd_HHmmss` (UTC).
///
/// Instants before the epoch are clamped to the epoch.
#[must_use]
pub fn backup_timestamp(millis: i64) -> String {
    let secs = u64::try_from(millis.max(0).div_euclid(1000)).unwrap_or_default();
    let (year, month, day, hour, minute, second) = epoch_to_utc(secs);
    format!("{year:04}{month:02}{day:02}_{hour:02}{minute:02}{second:02}")
}

/// Whole days since the epoch; two instants on the same UTC calendar day
/// share a day number.
#[must_use]
pub const fn day_number(millis: i64) -> i64 {
    millis.div_euclid(MILLIS_PER_DAY)
}

/// Convert epoch seconds to (year, month, day, hour, minute, second) in UTC.
///
/// This is a simplified civil calendar computation (valid for years 1970–9999).
#[allow(clippy::arithmetic_side_effects)]
const fn epoch_to_utc(epoch_secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    // Howard Hinnant's `civil_from_days`.
    let secs_per_day: u64 = 86_400;
    let total_days = epoch_secs / secs_per_day;
    let remaining_secs = epoch_secs % secs_per_day;

    let hour = remaining_secs / 3600;
    let minute = (remaining_secs % 3600) / 60;
    let second = remaining_secs % 60;

    // Days since 0000-03-01.
    let z = total_days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };

    (year, m, d, hour, minute, second)
}
