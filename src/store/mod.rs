pub mod migrations;

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::baseline::{AnalysisRecord, AnalysisStatus, AnalysisTrigger};
use crate::correlation::{Assessment, ChangeStatus, Checkpoint, DetectedChange, Horizon};
use crate::metrics::MetricDelta;
use crate::progress::ComposedProgress;
use crate::store::migrations::BASE_MIGRATION;

/// Canonical state for pages, changes, checkpoints, and analysis runs.
///
/// The correlation engine itself is pure; the concurrency guarantees it
/// assumes live here: checkpoints carry a `(change_id, horizon_days)`
/// uniqueness constraint and are written with `INSERT OR IGNORE`, and status
/// updates compare-and-swap on the current status, so racing workers cannot
/// double-apply an evaluation.
pub struct ChangeStore {
    conn: Connection,
}

impl ChangeStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    pub fn upsert_page(&self, page_id: &str, url: &str) -> Result<()> {
        self.conn.execute(
            r#"
INSERT INTO pages(id, url) VALUES (?1, ?2)
ON CONFLICT(id) DO UPDATE SET url = excluded.url
"#,
            params![page_id, url],
        )?;
        Ok(())
    }

    pub fn pin_baseline(&self, page_id: &str, analysis_id: Option<i64>) -> Result<()> {
        self.conn.execute(
            "UPDATE pages SET pinned_analysis_id = ?2 WHERE id = ?1",
            params![page_id, analysis_id],
        )?;
        Ok(())
    }

    pub fn pinned_analysis_id(&self, page_id: &str) -> Result<Option<i64>> {
        let pinned = self
            .conn
            .query_row(
                "SELECT pinned_analysis_id FROM pages WHERE id = ?1",
                params![page_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(pinned.flatten())
    }

    pub fn cache_progress(
        &self,
        page_id: &str,
        progress: &ComposedProgress,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE pages SET last_progress_json = ?2, last_progress_at = ?3 WHERE id = ?1",
            params![page_id, serde_json::to_string(progress)?, at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn last_progress_snapshot(&self, page_id: &str) -> Result<Option<String>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT last_progress_json FROM pages WHERE id = ?1",
                params![page_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(snapshot.flatten())
    }

    pub fn insert_change(
        &self,
        page_id: &str,
        element: &str,
        first_detected_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
INSERT INTO changes(page_id, element, first_detected_at, status)
VALUES (?1, ?2, ?3, ?4)
"#,
            params![
                page_id,
                element,
                first_detected_at.to_rfc3339(),
                ChangeStatus::Watching.as_slug()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn load_change(&self, change_id: i64) -> Result<Option<DetectedChange>> {
        let change = self
            .conn
            .query_row(
                r#"
SELECT id, page_id, element, first_detected_at, status, correlation_metrics_json
FROM changes
WHERE id = ?1
"#,
                params![change_id],
                row_to_change,
            )
            .optional()?;
        Ok(change)
    }

    /// Changes still subject to evaluation: everything except the terminal
    /// statuses. Validated/regressed/inconclusive rows stay in the pool for
    /// their reversal horizons.
    pub fn load_evaluable_changes(&self, page_id: Option<&str>) -> Result<Vec<DetectedChange>> {
        let sql = if page_id.is_some() {
            r#"
SELECT id, page_id, element, first_detected_at, status, correlation_metrics_json
FROM changes
WHERE page_id = ?1 AND status NOT IN ('reverted', 'superseded')
ORDER BY first_detected_at DESC, id DESC
"#
        } else {
            r#"
SELECT id, page_id, element, first_detected_at, status, correlation_metrics_json
FROM changes
WHERE status NOT IN ('reverted', 'superseded')
ORDER BY first_detected_at DESC, id DESC
"#
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = if let Some(page_id) = page_id {
            stmt.query_map(params![page_id], row_to_change)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_change)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// The progress composer's input: watching/validated/regressed changes,
    /// newest detection first.
    pub fn load_active_changes(&self, page_id: &str) -> Result<Vec<DetectedChange>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT id, page_id, element, first_detected_at, status, correlation_metrics_json
FROM changes
WHERE page_id = ?1 AND status IN ('watching', 'validated', 'regressed')
ORDER BY first_detected_at DESC, id DESC
"#,
        )?;
        let rows = stmt
            .query_map(params![page_id], row_to_change)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_correlation_metrics(&self, change_id: i64, metrics: &[MetricDelta]) -> Result<()> {
        self.conn.execute(
            "UPDATE changes SET correlation_metrics_json = ?2 WHERE id = ?1",
            params![change_id, serde_json::to_string(metrics)?],
        )?;
        Ok(())
    }

    /// Compare-and-swap status update. Returns false when another worker
    /// already moved the change, in which case the caller must not treat
    /// its transition as applied.
    pub fn update_change_status(
        &self,
        change_id: i64,
        from: ChangeStatus,
        to: ChangeStatus,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE changes SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![change_id, from.as_slug(), to.as_slug()],
        )?;
        Ok(updated > 0)
    }

    /// Idempotent under at-least-once delivery: the second writer for the
    /// same (change, horizon) gets false and must skip the transition.
    pub fn insert_checkpoint(&self, checkpoint: &Checkpoint) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
INSERT OR IGNORE INTO checkpoints(change_id, horizon_days, assessment, metrics_json, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
            params![
                checkpoint.change_id,
                checkpoint.horizon.days(),
                checkpoint.assessment.as_slug(),
                serde_json::to_string(&checkpoint.metrics)?,
                checkpoint.created_at.to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    /// The horizons already evaluated for a change, as day counts. The
    /// scheduler treats this as the completed set.
    pub fn existing_horizons(&self, change_id: i64) -> Result<Vec<u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT horizon_days FROM checkpoints WHERE change_id = ?1 ORDER BY horizon_days",
        )?;
        let rows = stmt
            .query_map(params![change_id], |row| row.get::<_, u32>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_checkpoints(&self, change_id: i64) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT change_id, horizon_days, assessment, metrics_json, created_at
FROM checkpoints
WHERE change_id = ?1
ORDER BY horizon_days
"#,
        )?;
        let rows = stmt
            .query_map(params![change_id], row_to_checkpoint)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_analysis(
        &self,
        page_id: &str,
        trigger: AnalysisTrigger,
        status: AnalysisStatus,
        screenshot_path: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
INSERT INTO analyses(page_id, trigger_kind, status, screenshot_path, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
            params![
                page_id,
                trigger.as_slug(),
                status.as_slug(),
                screenshot_path,
                created_at.to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn load_analyses(&self, page_id: &str) -> Result<Vec<AnalysisRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT id, page_id, trigger_kind, status, screenshot_path, created_at
FROM analyses
WHERE page_id = ?1
ORDER BY created_at DESC, id DESC
"#,
        )?;
        let rows = stmt
            .query_map(params![page_id], row_to_analysis)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Candidates for the backup scheduler: scheduled runs still pending.
    /// The caller filters them through the recovery window so the window
    /// logic stays in one place.
    pub fn load_pending_scheduled_analyses(&self) -> Result<Vec<AnalysisRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT id, page_id, trigger_kind, status, screenshot_path, created_at
FROM analyses
WHERE status = 'pending' AND trigger_kind IN ('daily', 'weekly')
ORDER BY created_at ASC, id ASC
"#,
        )?;
        let rows = stmt
            .query_map([], row_to_analysis)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_analysis_status(&self, analysis_id: i64, status: AnalysisStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE analyses SET status = ?2 WHERE id = ?1",
            params![analysis_id, status.as_slug()],
        )?;
        Ok(())
    }
}

fn row_to_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<DetectedChange> {
    let status_raw: String = row.get(4)?;
    let status = status_raw
        .parse::<ChangeStatus>()
        .unwrap_or(ChangeStatus::Watching);
    let metrics_raw: Option<String> = row.get(5)?;
    let correlation_metrics =
        metrics_raw.and_then(|json| serde_json::from_str::<Vec<MetricDelta>>(&json).ok());
    Ok(DetectedChange {
        id: row.get(0)?,
        page_id: row.get(1)?,
        element: row.get(2)?,
        first_detected_at: parse_timestamp(&row.get::<_, String>(3)?),
        status,
        correlation_metrics,
    })
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let horizon_days: u32 = row.get(1)?;
    let horizon = Horizon::from_days(horizon_days).unwrap_or(Horizon::D7);
    let assessment_raw: String = row.get(2)?;
    let assessment = assessment_raw
        .parse::<Assessment>()
        .unwrap_or(Assessment::Inconclusive);
    let metrics_raw: String = row.get(3)?;
    let metrics = serde_json::from_str::<Vec<MetricDelta>>(&metrics_raw).unwrap_or_default();
    Ok(Checkpoint {
        change_id: row.get(0)?,
        horizon,
        assessment,
        metrics,
        created_at: parse_timestamp(&row.get::<_, String>(4)?),
    })
}

fn row_to_analysis(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let trigger_raw: String = row.get(2)?;
    let trigger = trigger_raw
        .parse::<AnalysisTrigger>()
        .unwrap_or(AnalysisTrigger::Manual);
    let status_raw: String = row.get(3)?;
    let status = status_raw
        .parse::<AnalysisStatus>()
        .unwrap_or(AnalysisStatus::Pending);
    Ok(AnalysisRecord {
        id: row.get(0)?,
        page_id: row.get(1)?,
        trigger,
        status,
        screenshot_path: row.get(4)?,
        created_at: parse_timestamp(&row.get::<_, String>(5)?),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use crate::metrics::MetricAssessment;

    use super::*;

    fn store() -> ChangeStore {
        ChangeStore::open_in_memory().expect("in-memory store")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap()
    }

    fn delta() -> MetricDelta {
        MetricDelta {
            name: "bounce_rate".to_string(),
            before: 42.0,
            after: 36.8,
            change_percent: -12.4,
            assessment: MetricAssessment::Improved,
        }
    }

    #[test]
    fn change_roundtrips_with_metrics_snapshot() {
        let store = store();
        store.upsert_page("landing", "https://example.com/").unwrap();
        let detected = now() - Duration::days(31);
        let id = store.insert_change("landing", "Hero headline", detected).unwrap();

        store.set_correlation_metrics(id, &[delta()]).unwrap();
        let change = store.load_change(id).unwrap().expect("change exists");
        assert_eq!(change.page_id, "landing");
        assert_eq!(change.element, "Hero headline");
        assert_eq!(change.status, ChangeStatus::Watching);
        assert_eq!(change.first_detected_at, detected);
        assert_eq!(change.correlation_metrics.unwrap()[0].name, "bounce_rate");
    }

    #[test]
    fn second_checkpoint_for_same_horizon_is_ignored() {
        let store = store();
        let id = store
            .insert_change("landing", "Hero headline", now() - Duration::days(8))
            .unwrap();
        let checkpoint = Checkpoint {
            change_id: id,
            horizon: Horizon::D7,
            assessment: Assessment::Improved,
            metrics: vec![delta()],
            created_at: now(),
        };
        assert!(store.insert_checkpoint(&checkpoint).unwrap());
        assert!(!store.insert_checkpoint(&checkpoint).unwrap());
        assert_eq!(store.existing_horizons(id).unwrap(), vec![7]);
        assert_eq!(store.load_checkpoints(id).unwrap().len(), 1);
    }

    #[test]
    fn status_update_is_compare_and_swap() {
        let store = store();
        let id = store
            .insert_change("landing", "Hero headline", now() - Duration::days(31))
            .unwrap();

        assert!(store
            .update_change_status(id, ChangeStatus::Watching, ChangeStatus::Validated)
            .unwrap());
        // a racing worker with the stale expectation loses
        assert!(!store
            .update_change_status(id, ChangeStatus::Watching, ChangeStatus::Inconclusive)
            .unwrap());
        let change = store.load_change(id).unwrap().unwrap();
        assert_eq!(change.status, ChangeStatus::Validated);
    }

    #[test]
    fn active_changes_exclude_resolved_and_terminal_rows() {
        let store = store();
        let watching = store
            .insert_change("landing", "CTA button", now() - Duration::days(5))
            .unwrap();
        let validated = store
            .insert_change("landing", "Hero headline", now() - Duration::days(40))
            .unwrap();
        let reverted = store
            .insert_change("landing", "Footer links", now() - Duration::days(50))
            .unwrap();
        store
            .update_change_status(validated, ChangeStatus::Watching, ChangeStatus::Validated)
            .unwrap();
        store
            .update_change_status(reverted, ChangeStatus::Watching, ChangeStatus::Reverted)
            .unwrap();

        let active = store.load_active_changes("landing").unwrap();
        let ids: Vec<i64> = active.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![watching, validated]);

        let evaluable = store.load_evaluable_changes(Some("landing")).unwrap();
        assert!(evaluable.iter().all(|c| c.id != reverted));
    }

    #[test]
    fn progress_snapshot_roundtrips() {
        let store = store();
        store.upsert_page("landing", "https://example.com/").unwrap();
        let progress = ComposedProgress {
            validated: 1,
            watching: 2,
            validated_items: Vec::new(),
            watching_items: Vec::new(),
        };
        store.cache_progress("landing", &progress, now()).unwrap();
        let snapshot = store.last_progress_snapshot("landing").unwrap().unwrap();
        let decoded: ComposedProgress = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(decoded, progress);

        assert_eq!(store.last_progress_snapshot("missing").unwrap(), None);
    }

    #[test]
    fn pending_scheduled_analyses_surface_for_recovery() {
        let store = store();
        store
            .insert_analysis(
                "landing",
                AnalysisTrigger::Daily,
                AnalysisStatus::Pending,
                None,
                now() - Duration::hours(3),
            )
            .unwrap();
        store
            .insert_analysis(
                "landing",
                AnalysisTrigger::Manual,
                AnalysisStatus::Pending,
                None,
                now() - Duration::hours(3),
            )
            .unwrap();
        store
            .insert_analysis(
                "landing",
                AnalysisTrigger::Weekly,
                AnalysisStatus::Completed,
                Some("shots/1.png"),
                now() - Duration::hours(5),
            )
            .unwrap();

        let pending = store.load_pending_scheduled_analyses().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].trigger, AnalysisTrigger::Daily);

        store
            .mark_analysis_status(pending[0].id, AnalysisStatus::Completed)
            .unwrap();
        assert!(store.load_pending_scheduled_analyses().unwrap().is_empty());
    }

    #[test]
    fn pinned_baseline_id_roundtrips() {
        let store = store();
        store.upsert_page("landing", "https://example.com/").unwrap();
        assert_eq!(store.pinned_analysis_id("landing").unwrap(), None);
        store.pin_baseline("landing", Some(7)).unwrap();
        assert_eq!(store.pinned_analysis_id("landing").unwrap(), Some(7));
        store.pin_baseline("landing", None).unwrap();
        assert_eq!(store.pinned_analysis_id("landing").unwrap(), None);
    }
}
