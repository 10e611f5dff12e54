use crate::correlation::{Assessment, ChangeStatus, Checkpoint, Horizon, StatusTransition};

/// The status state machine. Returns the transition to apply, or `None` when
/// the checkpoint leaves the change where it is.
///
/// Rules, in order: terminal statuses never move; D+7/D+14 only observe; the
/// D+30 decision horizon resolves a `watching` change (and nothing else); the
/// D+60/D+90 reversal horizons flip validated/regressed on an opposite
/// signal and resolve inconclusive on a clear one. A change still `watching`
/// at a reversal horizon stays put.
///
/// Prior checkpoints are accepted for future tie-breaking but the rules
/// branch only on the current status; history is already folded into it.
pub fn resolve_status_transition(
    current: ChangeStatus,
    horizon: Horizon,
    assessment: Assessment,
    _prior_checkpoints: &[Checkpoint],
) -> Option<StatusTransition> {
    if current.is_terminal() {
        return None;
    }

    match horizon {
        Horizon::D7 | Horizon::D14 => None,
        Horizon::D30 => {
            if current != ChangeStatus::Watching {
                return None;
            }
            let (new_status, reason) = match assessment {
                Assessment::Improved => (ChangeStatus::Validated, "D+30: metrics improved"),
                Assessment::Regressed => (ChangeStatus::Regressed, "D+30: metrics regressed"),
                Assessment::Neutral | Assessment::Inconclusive => {
                    (ChangeStatus::Inconclusive, "D+30: no significant change")
                }
            };
            Some(StatusTransition {
                new_status,
                reason: reason.to_string(),
            })
        }
        Horizon::D60 | Horizon::D90 => {
            let days = horizon.days();
            match (current, assessment) {
                (ChangeStatus::Validated, Assessment::Regressed) => Some(StatusTransition {
                    new_status: ChangeStatus::Regressed,
                    reason: format!("D+{days}: trend reversed to regression"),
                }),
                (ChangeStatus::Regressed, Assessment::Improved) => Some(StatusTransition {
                    new_status: ChangeStatus::Validated,
                    reason: format!("D+{days}: trend reversed to improvement"),
                }),
                (ChangeStatus::Inconclusive, Assessment::Improved) => Some(StatusTransition {
                    new_status: ChangeStatus::Validated,
                    reason: format!("D+{days}: clear signal emerged"),
                }),
                (ChangeStatus::Inconclusive, Assessment::Regressed) => Some(StatusTransition {
                    new_status: ChangeStatus::Regressed,
                    reason: format!("D+{days}: clear signal emerged"),
                }),
                _ => None,
            }
        }
    }
}
