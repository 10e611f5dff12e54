pub mod selector;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kicked off a page analysis run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTrigger {
    Daily,
    Weekly,
    Manual,
    ChangeDetected,
}

impl AnalysisTrigger {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Manual => "manual",
            Self::ChangeDetected => "change_detected",
        }
    }

    /// Scheduled runs are the preferred baseline source and the only ones
    /// the backup scheduler re-triggers.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Daily | Self::Weekly)
    }
}

impl Display for AnalysisTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown analysis trigger: {0}")]
pub struct TriggerParseError(pub String);

impl FromStr for AnalysisTrigger {
    type Err = TriggerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "manual" => Ok(Self::Manual),
            "change_detected" | "change-detected" => Ok(Self::ChangeDetected),
            _ => Err(TriggerParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl Display for AnalysisStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown analysis status: {0}")]
pub struct AnalysisStatusParseError(pub String);

impl FromStr for AnalysisStatus {
    type Err = AnalysisStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AnalysisStatusParseError(s.to_string())),
        }
    }
}

/// One page analysis run, as persisted by the scan pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub page_id: String,
    pub trigger: AnalysisTrigger,
    pub status: AnalysisStatus,
    pub screenshot_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Only a completed analysis with a screenshot can anchor a lightweight
    /// diff.
    pub fn is_usable_baseline(&self) -> bool {
        self.status == AnalysisStatus::Completed && self.screenshot_path.is_some()
    }
}

/// The comparison snapshot lightweight diffing runs against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Baseline {
    pub analysis_id: i64,
    pub page_id: String,
    pub screenshot_path: String,
    pub created_at: DateTime<Utc>,
}

impl Baseline {
    pub fn from_analysis(analysis: &AnalysisRecord) -> Option<Self> {
        Some(Self {
            analysis_id: analysis.id,
            page_id: analysis.page_id.clone(),
            screenshot_path: analysis.screenshot_path.clone()?,
            created_at: analysis.created_at,
        })
    }
}
