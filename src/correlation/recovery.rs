use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How far back the backup scheduler looks for stuck work.
pub const RECOVERY_LOOKBACK_HOURS: i64 = 48;
/// How long an analysis must sit pending before it counts as stuck.
pub const RECOVERY_STALE_HOURS: i64 = 2;

/// The idempotent time window a backup scheduler uses to re-trigger
/// evaluation for missed runs. Any backup trigger re-deriving this from the
/// same `now` gets the same window, which keeps the backup path safe to run
/// alongside the primary event-driven scheduler.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RecoveryWindow {
    pub lookback_start: DateTime<Utc>,
    pub stale_threshold: DateTime<Utc>,
}

pub fn recovery_window(now: DateTime<Utc>) -> RecoveryWindow {
    RecoveryWindow {
        lookback_start: now - Duration::hours(RECOVERY_LOOKBACK_HOURS),
        stale_threshold: now - Duration::hours(RECOVERY_STALE_HOURS),
    }
}

impl RecoveryWindow {
    /// Inclusive on both ends: old enough to be stuck, not so old it is
    /// stale garbage.
    pub fn contains(&self, created_at: DateTime<Utc>) -> bool {
        created_at >= self.lookback_start && created_at <= self.stale_threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn includes_three_hour_old_pending_work_but_not_one_hour_old() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap();
        let window = recovery_window(now);

        let three_hours_ago = Utc.with_ymd_and_hms(2026, 2, 17, 9, 0, 0).unwrap();
        let one_hour_ago = Utc.with_ymd_and_hms(2026, 2, 17, 11, 0, 0).unwrap();
        assert!(window.contains(three_hours_ago));
        assert!(!window.contains(one_hour_ago));
    }

    #[test]
    fn bounds_are_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap();
        let window = recovery_window(now);
        assert!(window.contains(window.lookback_start));
        assert!(window.contains(window.stale_threshold));
        assert!(!window.contains(window.lookback_start - chrono::Duration::seconds(1)));
        assert!(!window.contains(window.stale_threshold + chrono::Duration::seconds(1)));
    }

    #[test]
    fn window_is_identical_when_rederived() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap();
        assert_eq!(recovery_window(now), recovery_window(now));
    }
}
