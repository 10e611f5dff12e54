pub mod normalize;
pub mod provider;

use serde::{Deserialize, Serialize};

/// Per-metric classification, applied upstream by the analytics adapter with
/// the metric's own sign convention (lower bounce rate is an improvement).
/// The engine aggregates these; it never re-derives them from the numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricAssessment {
    Improved,
    Regressed,
    Neutral,
}

/// One metric's before/after movement across a correlation window pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricDelta {
    pub name: String,
    pub before: f64,
    pub after: f64,
    pub change_percent: f64,
    pub assessment: MetricAssessment,
}

impl MetricDelta {
    pub fn is_neutral(&self) -> bool {
        self.assessment == MetricAssessment::Neutral
    }
}
