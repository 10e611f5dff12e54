use crate::metrics::MetricDelta;

/// Non-finite values from a flaky adapter default to zero movement instead
/// of poisoning the aggregation pass.
pub fn sanitize_value(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn sanitize_deltas(deltas: &mut [MetricDelta]) {
    for delta in deltas {
        delta.before = sanitize_value(delta.before);
        delta.after = sanitize_value(delta.after);
        delta.change_percent = sanitize_value(delta.change_percent);
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::MetricAssessment;

    use super::*;

    #[test]
    fn non_finite_values_default_to_zero() {
        let mut deltas = vec![MetricDelta {
            name: "bounce_rate".to_string(),
            before: f64::NAN,
            after: 38.0,
            change_percent: f64::INFINITY,
            assessment: MetricAssessment::Neutral,
        }];
        sanitize_deltas(&mut deltas);
        assert_eq!(deltas[0].before, 0.0);
        assert_eq!(deltas[0].after, 38.0);
        assert_eq!(deltas[0].change_percent, 0.0);
    }
}
