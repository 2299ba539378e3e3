//! Calendar helpers for month windows and day spans

use chrono::{Datelike, Duration, Months, NaiveDate};

/// First day of the month containing `date`
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month before the one containing `date`
pub fn start_of_previous_month(date: NaiveDate) -> NaiveDate {
    let first = start_of_month(date);
    first.checked_sub_months(Months::new(1)).unwrap_or(first)
}

/// Last day of the month before the one containing `date`
pub fn end_of_previous_month(date: NaiveDate) -> NaiveDate {
    start_of_month(date) - Duration::days(1)
}

/// Whole days from `from` to `to` (negative if `to` is earlier)
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Inclusive number of calendar days covered by `[first, last]`, at least 1
pub fn inclusive_span_days(first: NaiveDate, last: NaiveDate) -> i64 {
    (days_between(first, last).abs() + 1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_windows() {
        assert_eq!(start_of_month(d(2024, 3, 17)), d(2024, 3, 1));
        assert_eq!(start_of_previous_month(d(2024, 3, 17)), d(2024, 2, 1));
        assert_eq!(end_of_previous_month(d(2024, 3, 17)), d(2024, 2, 29));
    }

    #[test]
    fn test_month_windows_across_year_boundary() {
        assert_eq!(start_of_previous_month(d(2025, 1, 5)), d(2024, 12, 1));
        assert_eq!(end_of_previous_month(d(2025, 1, 5)), d(2024, 12, 31));
    }

    #[test]
    fn test_spans() {
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 1, 31)), 30);
        assert_eq!(inclusive_span_days(d(2024, 1, 1), d(2024, 1, 1)), 1);
        assert_eq!(inclusive_span_days(d(2024, 1, 1), d(2024, 1, 10)), 10);
    }
}
