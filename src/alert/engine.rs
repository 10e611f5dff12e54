use serde::{Deserialize, Serialize};

use crate::alert::rules::AlertEventKind;
use crate::correlation::ChangeStatus;
use crate::runner::EvaluationOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub title: String,
    pub body: String,
}

/// Turn an evaluation pass into notification events. Only applied
/// transitions alert; checkpoints that left the status alone stay quiet.
/// Reversal-horizon transitions get their own kind so users can mute the
/// noisier early decisions separately.
pub fn evaluate_alerts(outcomes: &[EvaluationOutcome]) -> Vec<AlertEvent> {
    let mut events = Vec::new();
    for outcome in outcomes {
        let Some(transition) = &outcome.transition else {
            continue;
        };
        let kind = if outcome.horizon.is_reversal() {
            AlertEventKind::TrendReversed
        } else {
            match transition.new_status {
                ChangeStatus::Validated => AlertEventKind::ChangeValidated,
                ChangeStatus::Regressed => AlertEventKind::ChangeRegressed,
                ChangeStatus::Inconclusive => AlertEventKind::ChangeInconclusive,
                _ => continue,
            }
        };
        let title = match kind {
            AlertEventKind::ChangeValidated => {
                format!("Change validated: {}", outcome.element)
            }
            AlertEventKind::ChangeRegressed => {
                format!("Change regressed: {}", outcome.element)
            }
            AlertEventKind::ChangeInconclusive => {
                format!("Change inconclusive: {}", outcome.element)
            }
            AlertEventKind::TrendReversed => {
                format!("Trend reversed: {}", outcome.element)
            }
        };
        events.push(AlertEvent {
            kind,
            title,
            body: format!("{} ({})", outcome.observation, transition.reason),
        });
    }
    events
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::correlation::{Assessment, Horizon, StatusTransition};

    use super::*;

    fn outcome(
        horizon: Horizon,
        assessment: Assessment,
        transition: Option<StatusTransition>,
    ) -> EvaluationOutcome {
        let detected = Utc.with_ymd_and_hms(2026, 2, 9, 12, 0, 0).unwrap()
            - Duration::days(i64::from(horizon.days()));
        EvaluationOutcome {
            change_id: 1,
            page_id: "landing".to_string(),
            element: "Hero headline".to_string(),
            horizon,
            assessment,
            transition,
            observation: crate::correlation::observe::format_observation(
                "Hero headline",
                detected,
                horizon,
                None,
                assessment,
            ),
        }
    }

    #[test]
    fn silent_checkpoints_produce_no_events() {
        let outcomes = vec![outcome(Horizon::D7, Assessment::Improved, None)];
        assert!(evaluate_alerts(&outcomes).is_empty());
    }

    #[test]
    fn decision_and_reversal_transitions_map_to_their_kinds() {
        let outcomes = vec![
            outcome(
                Horizon::D30,
                Assessment::Improved,
                Some(StatusTransition {
                    new_status: ChangeStatus::Validated,
                    reason: "D+30: metrics improved".to_string(),
                }),
            ),
            outcome(
                Horizon::D60,
                Assessment::Regressed,
                Some(StatusTransition {
                    new_status: ChangeStatus::Regressed,
                    reason: "D+60: trend reversed to regression".to_string(),
                }),
            ),
        ];
        let events = evaluate_alerts(&outcomes);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AlertEventKind::ChangeValidated);
        assert_eq!(events[1].kind, AlertEventKind::TrendReversed);
        assert!(events[1].body.contains("trend reversed"));
    }
}
