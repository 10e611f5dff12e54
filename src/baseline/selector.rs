use chrono::{DateTime, Duration, Utc};

use crate::baseline::{AnalysisRecord, Baseline};

/// A baseline older than this needs a fresh full analysis.
pub const DEFAULT_MAX_BASELINE_AGE_DAYS: i64 = 14;
/// Non-scheduled analyses must be at least this old before they can serve
/// as a fallback baseline; anything younger may still be settling.
pub const MIN_FALLBACK_BASELINE_AGE_HOURS: i64 = 24;

/// Choose the comparison snapshot for lightweight diffing.
///
/// Priority: the page's pinned analysis when it resolves to a completed run
/// with a screenshot; otherwise the most recent completed scheduled
/// (daily/weekly) run with a screenshot; otherwise the most recent completed
/// run of any trigger with a screenshot at least 24 hours old. `None` means
/// the caller must run a full analysis instead of a diff.
pub fn stable_baseline(
    pinned_analysis_id: Option<i64>,
    analyses: &[AnalysisRecord],
    now: DateTime<Utc>,
) -> Option<Baseline> {
    let mut recent_first: Vec<&AnalysisRecord> = analyses.iter().collect();
    recent_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if let Some(pinned) = pinned_analysis_id {
        if let Some(analysis) = recent_first
            .iter()
            .find(|a| a.id == pinned && a.is_usable_baseline())
        {
            return Baseline::from_analysis(analysis);
        }
    }

    if let Some(analysis) = recent_first
        .iter()
        .find(|a| a.is_usable_baseline() && a.trigger.is_scheduled())
    {
        return Baseline::from_analysis(analysis);
    }

    let min_age = Duration::hours(MIN_FALLBACK_BASELINE_AGE_HOURS);
    recent_first
        .iter()
        .find(|a| a.is_usable_baseline() && now - a.created_at >= min_age)
        .and_then(|analysis| Baseline::from_analysis(analysis))
}

pub fn is_baseline_stale(
    baseline: Option<&Baseline>,
    max_age_days: i64,
    now: DateTime<Utc>,
) -> bool {
    match baseline {
        None => true,
        Some(baseline) => now - baseline.created_at > Duration::days(max_age_days),
    }
}
