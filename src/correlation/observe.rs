use chrono::{DateTime, Utc};

use crate::correlation::{Assessment, Horizon};
use crate::metrics::MetricDelta;

/// Display names for the metric keys the analytics adapters emit. Unknown
/// keys pass through verbatim rather than failing.
pub fn friendly_metric_name(name: &str) -> &str {
    match name {
        "bounce_rate" => "bounce rate",
        "signups" => "signups",
        "conversion_rate" => "conversion rate",
        "session_duration" | "avg_session_duration" => "session duration",
        "pageviews" => "page views",
        "unique_visitors" => "unique visitors",
        "click_through_rate" => "click-through rate",
        other => other,
    }
}

/// Direction follows the sign of the movement only. Whether "up" is good
/// lives in the per-metric assessment, not here.
pub fn direction_word(change_percent: f64) -> &'static str {
    if change_percent < 0.0 {
        "down"
    } else {
        "up"
    }
}

/// "bounce rate down 12.4%" — shared between checkpoint observations and the
/// progress composer's validated items.
pub fn metric_movement_phrase(delta: &MetricDelta) -> String {
    format!(
        "{} {} {:.1}%",
        friendly_metric_name(&delta.name),
        direction_word(delta.change_percent),
        delta.change_percent.abs()
    )
}

/// One sentence per checkpoint for notification and email rendering.
pub fn format_observation(
    element: &str,
    change_date: DateTime<Utc>,
    horizon: Horizon,
    metric: Option<&MetricDelta>,
    assessment: Assessment,
) -> String {
    let date = change_date.format("%b %-d");
    let days = horizon.days();
    match metric {
        Some(delta) if assessment != Assessment::Inconclusive => format!(
            "{element} changed on {date}. After {days} days, {}.",
            metric_movement_phrase(delta)
        ),
        _ => format!(
            "{element} changed on {date}. After {days} days, no significant metric movement."
        ),
    }
}
