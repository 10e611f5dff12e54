use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::correlation::observe::metric_movement_phrase;
use crate::correlation::schedule::elapsed_days;
use crate::correlation::{ChangeStatus, DetectedChange};
use crate::progress::{ComposedProgress, ValidatedItem, WatchingItem, DAYS_NEEDED_FOR_DECISION};

/// Aggregate a page's active changes into the dashboard rollup. Validated
/// and regressed changes become validated items with a friendly one-liner;
/// watching changes report how many days of data they have toward the
/// decision horizon. Inconclusive and terminal rows are not part of the
/// live summary.
pub fn compose_progress(changes: &[DetectedChange], now: DateTime<Utc>) -> ComposedProgress {
    let mut ordered: Vec<&DetectedChange> = changes.iter().collect();
    ordered.sort_by(|a, b| b.first_detected_at.cmp(&a.first_detected_at));

    let mut validated_items = Vec::new();
    let mut watching_items = Vec::new();
    for change in ordered {
        match change.status {
            ChangeStatus::Validated | ChangeStatus::Regressed => {
                validated_items.push(ValidatedItem {
                    change_id: change.id,
                    element: change.element.clone(),
                    status: change.status,
                    detail: validated_detail(change),
                });
            }
            ChangeStatus::Watching => {
                watching_items.push(WatchingItem {
                    change_id: change.id,
                    element: change.element.clone(),
                    days_of_data: elapsed_days(change.first_detected_at, now),
                    days_needed: DAYS_NEEDED_FOR_DECISION,
                });
            }
            ChangeStatus::Inconclusive | ChangeStatus::Reverted | ChangeStatus::Superseded => {}
        }
    }

    ComposedProgress {
        validated: validated_items.len(),
        watching: watching_items.len(),
        validated_items,
        watching_items,
    }
}

/// Fail closed: a data-access error produces no summary at all, never a
/// partial or zero-filled one, so the caller falls back to the last
/// persisted snapshot instead of showing a wrong "all clear".
pub fn compose_or_fail_closed(
    loaded: Result<Vec<DetectedChange>>,
    now: DateTime<Utc>,
) -> Option<ComposedProgress> {
    match loaded {
        Ok(changes) => Some(compose_progress(&changes, now)),
        Err(err) => {
            warn!("progress composition failed closed: {err:#}");
            None
        }
    }
}

/// The fallback path: decode the last persisted snapshot. Kept separate from
/// the live composition so the two never blend inside one function.
pub fn last_canonical_progress(snapshot_json: Option<&str>) -> Option<ComposedProgress> {
    serde_json::from_str(snapshot_json?).ok()
}

fn validated_detail(change: &DetectedChange) -> String {
    let Some(metrics) = change
        .correlation_metrics
        .as_deref()
        .filter(|m| !m.is_empty())
    else {
        return "Correlation confirmed".to_string();
    };
    let headline = metrics
        .iter()
        .find(|m| !m.is_neutral())
        .unwrap_or(&metrics[0]);
    capitalize(&metric_movement_phrase(headline))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{Duration, TimeZone, Utc};

    use crate::metrics::{MetricAssessment, MetricDelta};

    use super::*;

    fn change(
        id: i64,
        status: ChangeStatus,
        detected_at: DateTime<Utc>,
        metrics: Option<Vec<MetricDelta>>,
    ) -> DetectedChange {
        DetectedChange {
            id,
            page_id: "landing".to_string(),
            element: format!("element-{id}"),
            first_detected_at: detected_at,
            status,
            correlation_metrics: metrics,
        }
    }

    fn delta(name: &str, change_percent: f64, assessment: MetricAssessment) -> MetricDelta {
        MetricDelta {
            name: name.to_string(),
            before: 50.0,
            after: 50.0 * (1.0 + change_percent / 100.0),
            change_percent,
            assessment,
        }
    }

    #[test]
    fn counts_and_items_split_by_status() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap();
        let changes = vec![
            change(
                1,
                ChangeStatus::Validated,
                now - Duration::days(35),
                Some(vec![
                    delta("pageviews", 0.2, MetricAssessment::Neutral),
                    delta("bounce_rate", -12.4, MetricAssessment::Improved),
                ]),
            ),
            change(2, ChangeStatus::Watching, now - Duration::days(9), None),
            change(3, ChangeStatus::Regressed, now - Duration::days(40), None),
            change(4, ChangeStatus::Inconclusive, now - Duration::days(33), None),
        ];

        let progress = compose_progress(&changes, now);
        assert_eq!(progress.validated, 2);
        assert_eq!(progress.watching, 1);
        assert_eq!(progress.validated_items.len(), 2);
        assert_eq!(progress.watching_items.len(), 1);

        // newest first
        assert_eq!(progress.validated_items[0].change_id, 1);
        assert_eq!(progress.validated_items[1].change_id, 3);
    }

    #[test]
    fn validated_detail_prefers_the_first_non_neutral_metric() {
        let now = Utc::now();
        let changes = vec![change(
            1,
            ChangeStatus::Validated,
            now - Duration::days(31),
            Some(vec![
                delta("pageviews", 0.2, MetricAssessment::Neutral),
                delta("bounce_rate", -12.4, MetricAssessment::Improved),
            ]),
        )];
        let progress = compose_progress(&changes, now);
        assert_eq!(progress.validated_items[0].detail, "Bounce rate down 12.4%");
    }

    #[test]
    fn validated_detail_falls_back_to_first_metric_then_to_confirmation() {
        let now = Utc::now();
        let all_neutral = vec![change(
            1,
            ChangeStatus::Validated,
            now - Duration::days(31),
            Some(vec![delta("signups", 0.8, MetricAssessment::Neutral)]),
        )];
        let progress = compose_progress(&all_neutral, now);
        assert_eq!(progress.validated_items[0].detail, "Signups up 0.8%");

        let no_metrics = vec![change(2, ChangeStatus::Regressed, now - Duration::days(31), None)];
        let progress = compose_progress(&no_metrics, now);
        assert_eq!(progress.validated_items[0].detail, "Correlation confirmed");
    }

    #[test]
    fn watching_items_report_days_toward_the_decision_horizon() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap();
        let changes = vec![change(
            1,
            ChangeStatus::Watching,
            now - Duration::days(9),
            None,
        )];
        let progress = compose_progress(&changes, now);
        assert_eq!(progress.watching_items[0].days_of_data, 9);
        assert_eq!(progress.watching_items[0].days_needed, 30);
    }

    #[test]
    fn future_detection_timestamps_clamp_to_zero_days() {
        let now = Utc::now();
        let changes = vec![change(
            1,
            ChangeStatus::Watching,
            now + Duration::days(2),
            None,
        )];
        let progress = compose_progress(&changes, now);
        assert_eq!(progress.watching_items[0].days_of_data, 0);
    }

    #[test]
    fn fails_closed_on_data_access_error() {
        let now = Utc::now();
        assert_eq!(compose_or_fail_closed(Err(anyhow!("db locked")), now), None);
        let live = compose_or_fail_closed(Ok(Vec::new()), now).expect("empty page composes");
        assert_eq!(live.validated, 0);
        assert_eq!(live.watching, 0);
    }

    #[test]
    fn fallback_snapshot_roundtrips_and_tolerates_garbage() {
        let snapshot = ComposedProgress {
            validated: 1,
            watching: 2,
            validated_items: Vec::new(),
            watching_items: Vec::new(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(last_canonical_progress(Some(&json)), Some(snapshot));
        assert_eq!(last_canonical_progress(Some("not json")), None);
        assert_eq!(last_canonical_progress(None), None);
    }
}
