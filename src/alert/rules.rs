use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    ChangeValidated,
    ChangeRegressed,
    ChangeInconclusive,
    TrendReversed,
}
