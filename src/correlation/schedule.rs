use chrono::{DateTime, Utc};

use crate::correlation::Horizon;

/// Whole days elapsed between two instants, clamped to zero so clock skew or
/// a malformed detection timestamp degrades to "no data yet" instead of
/// scheduling horizons in the past.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days().max(0)
}

/// Horizons now due for a change: every `h` with `age >= h` that has no
/// recorded checkpoint yet, ascending. Several horizons come back at once
/// when evaluation was skipped for a while.
pub fn eligible_horizons(
    detected_at: DateTime<Utc>,
    now: DateTime<Utc>,
    existing: &[u32],
) -> Vec<Horizon> {
    let age = elapsed_days(detected_at, now);
    Horizon::ALL
        .into_iter()
        .filter(|h| age >= i64::from(h.days()))
        .filter(|h| !existing.contains(&h.days()))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn at(s: &str) -> chrono::DateTime<Utc> {
        s.parse().expect("bad test timestamp")
    }

    #[test]
    fn one_week_old_change_is_due_at_seven_days() {
        let due = eligible_horizons(
            at("2026-02-09T12:00:00Z"),
            at("2026-02-16T12:00:00Z"),
            &[],
        );
        assert_eq!(due, vec![Horizon::D7]);
    }

    #[test]
    fn skipped_runs_surface_cumulative_horizons() {
        let due = eligible_horizons(
            at("2026-01-17T12:00:00Z"),
            at("2026-02-16T12:00:00Z"),
            &[7],
        );
        assert_eq!(due, vec![Horizon::D14, Horizon::D30]);
    }

    #[test]
    fn boundary_age_equal_to_horizon_is_due() {
        let detected = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = detected + chrono::Duration::days(30);
        let due = eligible_horizons(detected, now, &[7, 14]);
        assert_eq!(due, vec![Horizon::D30]);

        let just_short = detected + chrono::Duration::days(30) - chrono::Duration::seconds(1);
        assert!(eligible_horizons(detected, just_short, &[7, 14]).is_empty());
    }

    #[test]
    fn hundred_day_old_change_with_partial_history() {
        let detected = Utc.with_ymd_and_hms(2025, 11, 1, 8, 30, 0).unwrap();
        let now = detected + chrono::Duration::days(100);
        let due = eligible_horizons(detected, now, &[7, 30, 60]);
        assert_eq!(due, vec![Horizon::D14, Horizon::D90]);
    }

    #[test]
    fn fully_evaluated_change_has_nothing_due() {
        let detected = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let now = detected + chrono::Duration::days(365);
        assert!(eligible_horizons(detected, now, &[7, 14, 30, 60, 90]).is_empty());
    }

    #[test]
    fn detection_in_the_future_yields_nothing() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap();
        let detected = now + chrono::Duration::days(3);
        assert_eq!(elapsed_days(detected, now), 0);
        assert!(eligible_horizons(detected, now, &[]).is_empty());
    }
}
