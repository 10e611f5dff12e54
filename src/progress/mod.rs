pub mod composer;

use serde::{Deserialize, Serialize};

use crate::correlation::{ChangeStatus, Horizon};

/// Days of data a change must accumulate before the decision horizon can
/// resolve it; surfaced on every watching item so the dashboard can render
/// progress toward the decision.
pub const DAYS_NEEDED_FOR_DECISION: u32 = Horizon::DECISION.days();

/// Page-level rollup of all active changes, recomputed on demand from the
/// canonical change rows. Also persisted on the page as a snapshot so the
/// display layer has a fallback when live composition fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposedProgress {
    pub validated: usize,
    pub watching: usize,
    pub validated_items: Vec<ValidatedItem>,
    pub watching_items: Vec<WatchingItem>,
}

/// A change the correlation engine has resolved (validated or regressed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatedItem {
    pub change_id: i64,
    pub element: String,
    pub status: ChangeStatus,
    pub detail: String,
}

/// A change still accumulating data ahead of its decision horizon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchingItem {
    pub change_id: i64,
    pub element: String,
    pub days_of_data: i64,
    pub days_needed: u32,
}
