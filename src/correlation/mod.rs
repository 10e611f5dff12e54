pub mod assess;
pub mod observe;
pub mod recovery;
pub mod schedule;
pub mod transition;
pub mod windows;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::MetricDelta;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Watching,
    Validated,
    Regressed,
    Inconclusive,
    Reverted,
    Superseded,
}

impl ChangeStatus {
    /// Statuses that appear in the live page summary.
    pub const ACTIVE: [ChangeStatus; 3] = [
        ChangeStatus::Watching,
        ChangeStatus::Validated,
        ChangeStatus::Regressed,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Validated => "validated",
            Self::Regressed => "regressed",
            Self::Inconclusive => "inconclusive",
            Self::Reverted => "reverted",
            Self::Superseded => "superseded",
        }
    }

    /// Reverted and superseded changes never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reverted | Self::Superseded)
    }
}

impl Display for ChangeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown change status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for ChangeStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watching" => Ok(Self::Watching),
            "validated" => Ok(Self::Validated),
            "regressed" => Ok(Self::Regressed),
            "inconclusive" => Ok(Self::Inconclusive),
            "reverted" => Ok(Self::Reverted),
            "superseded" => Ok(Self::Superseded),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

/// Aggregate classification of metric movement at a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Improved,
    Regressed,
    Neutral,
    Inconclusive,
}

impl Assessment {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Improved => "improved",
            Self::Regressed => "regressed",
            Self::Neutral => "neutral",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl Display for Assessment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown assessment: {0}")]
pub struct AssessmentParseError(pub String);

impl FromStr for Assessment {
    type Err = AssessmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "improved" => Ok(Self::Improved),
            "regressed" => Ok(Self::Regressed),
            "neutral" => Ok(Self::Neutral),
            "inconclusive" => Ok(Self::Inconclusive),
            _ => Err(AssessmentParseError(s.to_string())),
        }
    }
}

/// Fixed day-offsets from detection at which a checkpoint is evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "u32", try_from = "u32")]
pub enum Horizon {
    D7,
    D14,
    D30,
    D60,
    D90,
}

impl Horizon {
    pub const ALL: [Horizon; 5] = [
        Horizon::D7,
        Horizon::D14,
        Horizon::D30,
        Horizon::D60,
        Horizon::D90,
    ];

    /// The first horizon allowed to move a change out of `watching`.
    pub const DECISION: Horizon = Horizon::D30;

    pub const fn days(self) -> u32 {
        match self {
            Self::D7 => 7,
            Self::D14 => 14,
            Self::D30 => 30,
            Self::D60 => 60,
            Self::D90 => 90,
        }
    }

    pub fn from_days(days: u32) -> Option<Horizon> {
        Horizon::ALL.into_iter().find(|h| h.days() == days)
    }

    /// Too early to decide anything; checkpoints at these horizons only observe.
    pub fn is_observation_only(self) -> bool {
        matches!(self, Self::D7 | Self::D14)
    }

    /// Late horizons allowed to flip an already-resolved status.
    pub fn is_reversal(self) -> bool {
        matches!(self, Self::D60 | Self::D90)
    }
}

impl Display for Horizon {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "D+{}", self.days())
    }
}

impl From<Horizon> for u32 {
    fn from(value: Horizon) -> Self {
        value.days()
    }
}

#[derive(Debug, Error)]
#[error("unsupported horizon: {0} days")]
pub struct HorizonParseError(pub u32);

impl TryFrom<u32> for Horizon {
    type Error = HorizonParseError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Horizon::from_days(days).ok_or(HorizonParseError(days))
    }
}

/// One observed mutation of a page element, tracked for outcome correlation.
///
/// Created by the change-detection pipeline; only the transition resolver
/// moves its status afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedChange {
    pub id: i64,
    pub page_id: String,
    pub element: String,
    pub first_detected_at: DateTime<Utc>,
    pub status: ChangeStatus,
    pub correlation_metrics: Option<Vec<MetricDelta>>,
}

/// One evaluation of a change at a specific horizon. At most one checkpoint
/// exists per (change, horizon); immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub change_id: i64,
    pub horizon: Horizon,
    pub assessment: Assessment,
    pub metrics: Vec<MetricDelta>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusTransition {
    pub new_status: ChangeStatus,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_roundtrips_through_days() {
        for horizon in Horizon::ALL {
            assert_eq!(Horizon::from_days(horizon.days()), Some(horizon));
        }
        assert_eq!(Horizon::from_days(45), None);
    }

    #[test]
    fn status_slugs_roundtrip() {
        for status in [
            ChangeStatus::Watching,
            ChangeStatus::Validated,
            ChangeStatus::Regressed,
            ChangeStatus::Inconclusive,
            ChangeStatus::Reverted,
            ChangeStatus::Superseded,
        ] {
            assert_eq!(status.as_slug().parse::<ChangeStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ChangeStatus>().is_err());
    }

    #[test]
    fn only_reverted_and_superseded_are_terminal() {
        assert!(ChangeStatus::Reverted.is_terminal());
        assert!(ChangeStatus::Superseded.is_terminal());
        assert!(!ChangeStatus::Watching.is_terminal());
        assert!(!ChangeStatus::Inconclusive.is_terminal());
    }
}
