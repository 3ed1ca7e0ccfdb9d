//! Weekly cadence helpers.

use chrono::{Datelike, Duration, NaiveDate};

/// Mondays in `[start, end]`, the first being the first Monday on or after `start`.
pub fn week_starts(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let offset = (7 - start.weekday().num_days_from_monday()) % 7;
    let mut monday = start + Duration::days(offset as i64);
    let mut weeks = Vec::new();
    while monday <= end {
        weeks.push(monday);
        monday += Duration::days(7);
    }
    weeks
}

/// Monday through Friday of the week starting at `week_start`, clipped to `end`.
pub fn trading_days(week_start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    (0..5)
        .map(|i| week_start + Duration::days(i))
        .filter(|d| *d <= end)
        .collect()
}

/// Rankings that drive a week are taken from the preceding Friday.
pub fn signal_date(week_start: NaiveDate) -> NaiveDate {
    week_start - Duration::days(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn week_starts_from_midweek() {
        // 2024-01-03 is a Wednesday
        let weeks = week_starts(d(1, 3), d(1, 31));
        assert_eq!(weeks, vec![d(1, 8), d(1, 15), d(1, 22), d(1, 29)]);
    }

    #[test]
    fn week_starts_on_monday_includes_start() {
        let weeks = week_starts(d(1, 1), d(1, 8));
        assert_eq!(weeks, vec![d(1, 1), d(1, 8)]);
    }

    #[test]
    fn week_starts_empty_when_no_monday() {
        assert!(week_starts(d(1, 2), d(1, 5)).is_empty());
    }

    #[test]
    fn trading_days_clipped_to_end() {
        assert_eq!(trading_days(d(1, 8), d(1, 31)).len(), 5);
        assert_eq!(trading_days(d(1, 8), d(1, 10)), vec![d(1, 8), d(1, 9), d(1, 10)]);
    }

    #[test]
    fn signal_date_is_previous_friday() {
        let friday = signal_date(d(1, 8));
        assert_eq!(friday, d(1, 5));
        assert_eq!(friday.weekday(), Weekday::Fri);
    }
}
