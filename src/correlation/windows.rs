use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::correlation::Horizon;

/// Before/after query ranges for one horizon evaluation. Derived fresh per
/// evaluation and handed to the analytics adapter; never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelationWindows {
    pub before_start: DateTime<Utc>,
    pub before_end: DateTime<Utc>,
    pub after_start: DateTime<Utc>,
    pub after_end: DateTime<Utc>,
}

/// The before window ends at the detection day's UTC midnight so it lines up
/// with daily analytics aggregation; the after window starts at the exact
/// detection instant so elapsed impact is measured from the change itself.
/// Both spans equal the horizon.
pub fn compute_windows(change_date: DateTime<Utc>, horizon: Horizon) -> CorrelationWindows {
    let span = Duration::days(i64::from(horizon.days()));
    let before_end = change_date.date_naive().and_time(NaiveTime::MIN).and_utc();
    CorrelationWindows {
        before_start: before_end - span,
        before_end,
        after_start: change_date,
        after_end: change_date + span,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn before_window_ends_at_detection_day_midnight() {
        let detected = Utc.with_ymd_and_hms(2026, 2, 9, 15, 42, 10).unwrap();
        let windows = compute_windows(detected, Horizon::D7);
        assert_eq!(
            windows.before_end,
            Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap()
        );
        assert_eq!(
            windows.before_start,
            Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn after_window_keeps_intraday_detection_precision() {
        let detected = Utc.with_ymd_and_hms(2026, 2, 9, 15, 42, 10).unwrap();
        let windows = compute_windows(detected, Horizon::D30);
        assert_eq!(windows.after_start, detected);
        assert_eq!(
            windows.after_end,
            Utc.with_ymd_and_hms(2026, 3, 11, 15, 42, 10).unwrap()
        );
    }

    #[test]
    fn both_spans_equal_the_horizon_for_all_horizons() {
        let detected = Utc.with_ymd_and_hms(2026, 1, 15, 9, 5, 0).unwrap();
        for horizon in Horizon::ALL {
            let windows = compute_windows(detected, horizon);
            let expected = chrono::Duration::days(i64::from(horizon.days()));
            assert_eq!(windows.before_end - windows.before_start, expected);
            assert_eq!(windows.after_end - windows.after_start, expected);
        }
    }

    #[test]
    fn midnight_detection_gives_adjacent_windows() {
        let detected = Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap();
        let windows = compute_windows(detected, Horizon::D14);
        assert_eq!(windows.before_end, windows.after_start);
    }
}
