use crate::correlation::Assessment;
use crate::metrics::{MetricAssessment, MetricDelta};

/// Worst-case-wins aggregation of pre-classified per-metric assessments.
/// A single regressed metric outweighs any number of improvements, so a
/// user-facing "improved" always means zero regressions. Missing or empty
/// metrics are not an error; they classify as inconclusive.
pub fn assess_checkpoint(metrics: Option<&[MetricDelta]>) -> Assessment {
    let Some(metrics) = metrics else {
        return Assessment::Inconclusive;
    };
    if metrics.is_empty() {
        return Assessment::Inconclusive;
    }
    if metrics
        .iter()
        .any(|m| m.assessment == MetricAssessment::Regressed)
    {
        return Assessment::Regressed;
    }
    if metrics
        .iter()
        .any(|m| m.assessment == MetricAssessment::Improved)
    {
        return Assessment::Improved;
    }
    Assessment::Neutral
}
