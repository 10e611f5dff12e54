use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::correlation::windows::CorrelationWindows;
use crate::metrics::normalize::sanitize_deltas;
use crate::metrics::{MetricAssessment, MetricDelta};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 12;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("outcome-oracle/0.2")
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

/// The analytics seam. Implementations fetch already-classified metric
/// deltas for a page across the given before/after windows; the engine
/// consumes the result synchronously and never talks to an analytics
/// backend directly.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn fetch_deltas(
        &self,
        page_id: &str,
        windows: &CorrelationWindows,
    ) -> Result<Vec<MetricDelta>>;
}

/// Fetches deltas from a metrics endpoint that aggregates PostHog/GA4-style
/// analytics into the delta shape. Responses are parsed leniently; adapters
/// in the wild wrap the list and stringify numbers in creative ways.
pub struct HttpMetricsProvider {
    endpoint: String,
}

impl HttpMetricsProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MetricsProvider for HttpMetricsProvider {
    async fn fetch_deltas(
        &self,
        page_id: &str,
        windows: &CorrelationWindows,
    ) -> Result<Vec<MetricDelta>> {
        let response = HTTP_CLIENT
            .get(&self.endpoint)
            .query(&[
                ("page", page_id.to_string()),
                ("before_start", windows.before_start.to_rfc3339()),
                ("before_end", windows.before_end.to_rfc3339()),
                ("after_start", windows.after_start.to_rfc3339()),
                ("after_end", windows.after_end.to_rfc3339()),
            ])
            .send()
            .await
            .with_context(|| format!("failed GET request: {}", self.endpoint))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body: {}", self.endpoint))?;
        if !status.is_success() {
            let preview: String = body.chars().take(180).collect();
            return Err(anyhow!("GET {} returned {status}: {preview}", self.endpoint));
        }
        let value: Value = serde_json::from_str(&body)
            .with_context(|| format!("invalid JSON response: {}", self.endpoint))?;
        let mut deltas = parse_deltas(&value);
        sanitize_deltas(&mut deltas);
        Ok(deltas)
    }
}

/// In-memory provider for offline runs and tests. Pages without an entry
/// get an empty delta list, which the assessor classifies as inconclusive.
#[derive(Debug, Default)]
pub struct StaticMetricsProvider {
    by_page: HashMap<String, Vec<MetricDelta>>,
}

impl StaticMetricsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page_id: impl Into<String>, deltas: Vec<MetricDelta>) -> Self {
        self.by_page.insert(page_id.into(), deltas);
        self
    }
}

/// An empty endpoint means no adapter is wired up; evaluation then sees
/// empty deltas and records inconclusive checkpoints instead of failing.
pub fn provider_for_endpoint(endpoint: &str) -> Box<dyn MetricsProvider> {
    if endpoint.trim().is_empty() {
        Box::new(StaticMetricsProvider::new())
    } else {
        Box::new(HttpMetricsProvider::new(endpoint))
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn fetch_deltas(
        &self,
        page_id: &str,
        _windows: &CorrelationWindows,
    ) -> Result<Vec<MetricDelta>> {
        Ok(self.by_page.get(page_id).cloned().unwrap_or_default())
    }
}

/// Accepts a bare array or a `deltas`/`metrics`/`data` wrapper. Entries
/// missing a name are skipped; a missing assessment defaults to neutral.
pub fn parse_deltas(value: &Value) -> Vec<MetricDelta> {
    let entries = if let Some(array) = value.as_array() {
        array.as_slice()
    } else if let Some(object) = value.as_object() {
        ["deltas", "metrics", "data"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    } else {
        &[]
    };

    let mut out = Vec::new();
    for entry in entries {
        let Some(object) = entry.as_object() else {
            continue;
        };
        let Some(name) = object
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let assessment = object
            .get("assessment")
            .and_then(Value::as_str)
            .map(parse_metric_assessment)
            .unwrap_or(MetricAssessment::Neutral);
        out.push(MetricDelta {
            name: name.to_string(),
            before: number_field(object, "before"),
            after: number_field(object, "after"),
            change_percent: number_field(object, "change_percent"),
            assessment,
        });
    }
    out
}

fn parse_metric_assessment(raw: &str) -> MetricAssessment {
    match raw.trim().to_ascii_lowercase().as_str() {
        "improved" => MetricAssessment::Improved,
        "regressed" => MetricAssessment::Regressed,
        _ => MetricAssessment::Neutral,
    }
}

fn number_field(object: &Map<String, Value>, key: &str) -> f64 {
    object.get(key).and_then(to_f64).unwrap_or(0.0)
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let sanitized = s.trim().replace(',', "").replace('%', "");
            sanitized.parse::<f64>().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::correlation::windows::compute_windows;
    use crate::correlation::Horizon;

    use super::*;

    #[test]
    fn parses_deltas_from_wrapped_shape() {
        let payload = json!({
            "deltas": [
                {
                    "name": "bounce_rate",
                    "before": 42.0,
                    "after": "36.8",
                    "change_percent": "-12.4%",
                    "assessment": "improved"
                },
                {
                    "name": "signups",
                    "before": 120,
                    "after": 118,
                    "change_percent": -1.7
                }
            ]
        });
        let deltas = parse_deltas(&payload);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].name, "bounce_rate");
        assert_eq!(deltas[0].assessment, MetricAssessment::Improved);
        assert!((deltas[0].change_percent + 12.4).abs() < 1e-9);
        assert_eq!(deltas[1].assessment, MetricAssessment::Neutral);
    }

    #[test]
    fn skips_entries_without_a_name() {
        let payload = json!([
            { "before": 1.0, "after": 2.0 },
            { "name": "  ", "before": 1.0 },
            { "name": "pageviews", "change_percent": 4.2, "assessment": "regressed" }
        ]);
        let deltas = parse_deltas(&payload);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].name, "pageviews");
        assert_eq!(deltas[0].assessment, MetricAssessment::Regressed);
    }

    #[tokio::test]
    async fn static_provider_returns_empty_for_unknown_pages() {
        let provider = StaticMetricsProvider::new().with_page(
            "landing",
            vec![MetricDelta {
                name: "signups".to_string(),
                before: 100.0,
                after: 112.0,
                change_percent: 12.0,
                assessment: MetricAssessment::Improved,
            }],
        );
        let windows = compute_windows(chrono::Utc::now(), Horizon::D7);
        let known = provider.fetch_deltas("landing", &windows).await.unwrap();
        assert_eq!(known.len(), 1);
        let unknown = provider.fetch_deltas("pricing", &windows).await.unwrap();
        assert!(unknown.is_empty());
    }
}
