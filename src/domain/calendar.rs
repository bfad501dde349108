//! Business-day helpers
//!
//! Holding periods are measured in weekdays, independent of exchange holidays.

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};

/// True for Monday through Friday
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Count weekdays in the half-open interval `[start, end)`.
///
/// Negative when `end` precedes `start`.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return -business_days_between(end, start);
    }

    let span = (end - start).num_days();
    let full_weeks = span / 7;
    let mut count = full_weeks * 5;

    let mut day = start + Duration::days(full_weeks * 7);
    while day < end {
        if is_business_day(day) {
            count += 1;
        }
        day += Duration::days(1);
    }

    count
}

/// Shift a date back by whole calendar months, clamping to month end
pub fn months_before(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(months))
}
