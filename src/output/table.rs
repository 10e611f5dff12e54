use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::baseline::Baseline;
use crate::correlation::{ChangeStatus, Checkpoint, DetectedChange};
use crate::progress::ComposedProgress;
use crate::runner::EvaluationOutcome;

pub fn render_changes_table(changes: &[DetectedChange]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Page", "Element", "Detected At", "Status"]);
    for change in changes {
        table.add_row(Row::from(vec![
            Cell::new(change.id.to_string()),
            Cell::new(change.page_id.clone()),
            Cell::new(change.element.clone()),
            Cell::new(change.first_detected_at.to_rfc3339()),
            status_cell(change.status),
        ]));
    }
    table.to_string()
}

pub fn render_checkpoints_table(checkpoints: &[Checkpoint]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Horizon", "Assessment", "Metrics", "Created At"]);
    for checkpoint in checkpoints {
        let metrics = checkpoint
            .metrics
            .iter()
            .map(|m| format!("{} {:+.1}%", m.name, m.change_percent))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            checkpoint.horizon.to_string(),
            checkpoint.assessment.to_string(),
            if metrics.is_empty() { "-".to_string() } else { metrics },
            checkpoint.created_at.to_rfc3339(),
        ]);
    }
    table.to_string()
}

pub fn render_outcomes_table(outcomes: &[EvaluationOutcome]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Change", "Horizon", "Assessment", "Transition", "Observation"]);
    for outcome in outcomes {
        let transition = outcome
            .transition
            .as_ref()
            .map(|t| format!("{} ({})", t.new_status, t.reason))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            format!("{} #{}", outcome.element, outcome.change_id),
            outcome.horizon.to_string(),
            outcome.assessment.to_string(),
            transition,
            outcome.observation.clone(),
        ]);
    }
    table.to_string()
}

pub fn render_progress_table(progress: &ComposedProgress) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Element", "Detail"]);
    for item in &progress.validated_items {
        table.add_row(Row::from(vec![
            status_cell(item.status),
            Cell::new(item.element.clone()),
            Cell::new(item.detail.clone()),
        ]));
    }
    for item in &progress.watching_items {
        table.add_row(Row::from(vec![
            Cell::new("watching").fg(Color::Yellow),
            Cell::new(item.element.clone()),
            Cell::new(format!(
                "{}/{} days of data",
                item.days_of_data, item.days_needed
            )),
        ]));
    }

    let mut out = String::new();
    out.push_str(&table.to_string());
    out.push_str(&format!(
        "\nValidated: {}  Watching: {}",
        progress.validated, progress.watching
    ));
    out
}

pub fn render_baseline(baseline: Option<&Baseline>, stale: bool) -> String {
    match baseline {
        Some(baseline) => format!(
            "Baseline: analysis {} ({}) captured {}{}",
            baseline.analysis_id,
            baseline.screenshot_path,
            baseline.created_at.to_rfc3339(),
            if stale { " [STALE]" } else { "" }
        ),
        None => "No stable baseline available; a full analysis is required.".to_string(),
    }
}

fn status_cell(status: ChangeStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        ChangeStatus::Validated => cell.fg(Color::Green),
        ChangeStatus::Regressed => cell.fg(Color::Red),
        ChangeStatus::Watching => cell.fg(Color::Yellow),
        ChangeStatus::Inconclusive | ChangeStatus::Reverted | ChangeStatus::Superseded => cell,
    }
}
