use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::baseline::AnalysisStatus;
use crate::correlation::assess::assess_checkpoint;
use crate::correlation::observe::format_observation;
use crate::correlation::recovery::recovery_window;
use crate::correlation::schedule::eligible_horizons;
use crate::correlation::transition::resolve_status_transition;
use crate::correlation::windows::compute_windows;
use crate::correlation::{Assessment, Checkpoint, DetectedChange, Horizon, StatusTransition};
use crate::metrics::normalize::sanitize_deltas;
use crate::metrics::provider::MetricsProvider;
use crate::progress::composer::{compose_or_fail_closed, last_canonical_progress};
use crate::progress::ComposedProgress;
use crate::store::ChangeStore;

/// What one due horizon produced: the recorded assessment, the transition
/// that was actually applied (None when the state machine held still or a
/// racing worker won the swap), and the observation sentence for
/// notification rendering.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub change_id: i64,
    pub page_id: String,
    pub element: String,
    pub horizon: Horizon,
    pub assessment: Assessment,
    pub transition: Option<StatusTransition>,
    pub observation: String,
}

/// Evaluate every horizon now due for one change. Safe to re-run: already
/// recorded horizons are excluded up front and the checkpoint insert is
/// idempotent, so a second worker racing through the same due set records
/// nothing twice.
pub async fn evaluate_change(
    store: &ChangeStore,
    provider: &dyn MetricsProvider,
    change: &DetectedChange,
    now: DateTime<Utc>,
) -> Result<Vec<EvaluationOutcome>> {
    let mut outcomes = Vec::new();
    if change.status.is_terminal() {
        return Ok(outcomes);
    }

    let existing = store.existing_horizons(change.id)?;
    let due = eligible_horizons(change.first_detected_at, now, &existing);
    let mut current_status = change.status;

    for horizon in due {
        let windows = compute_windows(change.first_detected_at, horizon);
        let mut deltas = provider
            .fetch_deltas(&change.page_id, &windows)
            .await
            .with_context(|| {
                format!("failed fetching deltas for change {} at {horizon}", change.id)
            })?;
        sanitize_deltas(&mut deltas);
        let assessment = assess_checkpoint(Some(&deltas));

        let checkpoint = Checkpoint {
            change_id: change.id,
            horizon,
            assessment,
            metrics: deltas.clone(),
            created_at: now,
        };
        if !store.insert_checkpoint(&checkpoint)? {
            info!(
                "checkpoint for change {} at {horizon} already recorded, skipping",
                change.id
            );
            continue;
        }
        if !deltas.is_empty() {
            store.set_correlation_metrics(change.id, &deltas)?;
        }

        let prior = store.load_checkpoints(change.id)?;
        let mut applied = None;
        if let Some(transition) =
            resolve_status_transition(current_status, horizon, assessment, &prior)
        {
            if store.update_change_status(change.id, current_status, transition.new_status)? {
                info!(
                    "change {} moved {current_status} -> {} ({})",
                    change.id, transition.new_status, transition.reason
                );
                current_status = transition.new_status;
                applied = Some(transition);
            } else {
                warn!(
                    "change {} status moved concurrently, transition dropped",
                    change.id
                );
            }
        }

        let headline = deltas.iter().find(|m| !m.is_neutral()).or_else(|| deltas.first());
        let observation = format_observation(
            &change.element,
            change.first_detected_at,
            horizon,
            headline,
            assessment,
        );
        outcomes.push(EvaluationOutcome {
            change_id: change.id,
            page_id: change.page_id.clone(),
            element: change.element.clone(),
            horizon,
            assessment,
            transition: applied,
            observation,
        });
    }

    Ok(outcomes)
}

/// One evaluation pass over every non-terminal change (optionally scoped to
/// a page). A failure on one change is logged and skipped; its horizons stay
/// due and the next pass or the recovery sweep picks them up.
pub async fn run_evaluation_pass(
    store: &ChangeStore,
    provider: &dyn MetricsProvider,
    page_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<EvaluationOutcome>> {
    let changes = store.load_evaluable_changes(page_id)?;
    let mut outcomes = Vec::new();
    for change in &changes {
        match evaluate_change(store, provider, change, now).await {
            Ok(batch) => outcomes.extend(batch),
            Err(err) => warn!("evaluation failed for change {}: {err:#}", change.id),
        }
    }
    Ok(outcomes)
}

/// The backup scheduler. Re-derives the recovery window, re-triggers the
/// evaluation pass for every stuck scheduled analysis inside it, and marks
/// the analysis completed once its page evaluates. Re-running is safe: the
/// due set is recomputed by the scheduler, so at worst this derives
/// "nothing due" and does nothing.
pub async fn run_recovery(
    store: &ChangeStore,
    provider: &dyn MetricsProvider,
    now: DateTime<Utc>,
) -> Result<Vec<EvaluationOutcome>> {
    let window = recovery_window(now);
    let pending = store.load_pending_scheduled_analyses()?;
    let mut outcomes = Vec::new();
    for analysis in pending.iter().filter(|a| window.contains(a.created_at)) {
        info!(
            "recovering stuck {} analysis {} for page {}",
            analysis.trigger, analysis.id, analysis.page_id
        );
        match run_evaluation_pass(store, provider, Some(&analysis.page_id), now).await {
            Ok(batch) => {
                store.mark_analysis_status(analysis.id, AnalysisStatus::Completed)?;
                outcomes.extend(batch);
            }
            Err(err) => warn!(
                "recovery pass failed for page {}: {err:#}",
                analysis.page_id
            ),
        }
    }
    Ok(outcomes)
}

/// Live progress for a page, caching the composed snapshot on success and
/// falling back to the last persisted snapshot when composition fails
/// closed.
pub fn page_progress(
    store: &ChangeStore,
    page_id: &str,
    now: DateTime<Utc>,
) -> Option<ComposedProgress> {
    match compose_or_fail_closed(store.load_active_changes(page_id), now) {
        Some(progress) => {
            if let Err(err) = store.cache_progress(page_id, &progress, now) {
                warn!("failed caching progress snapshot for {page_id}: {err:#}");
            }
            Some(progress)
        }
        None => {
            let snapshot = store.last_progress_snapshot(page_id).ok().flatten();
            last_canonical_progress(snapshot.as_deref())
        }
    }
}
