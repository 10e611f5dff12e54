pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    pinned_analysis_id INTEGER,
    last_progress_json TEXT,
    last_progress_at TEXT
);

CREATE TABLE IF NOT EXISTS changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id TEXT NOT NULL,
    element TEXT NOT NULL,
    first_detected_at TEXT NOT NULL,
    status TEXT NOT NULL,
    correlation_metrics_json TEXT
);
CREATE INDEX IF NOT EXISTS idx_changes_page_detected
    ON changes(page_id, first_detected_at DESC);
CREATE INDEX IF NOT EXISTS idx_changes_status
    ON changes(status);

CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    change_id INTEGER NOT NULL,
    horizon_days INTEGER NOT NULL,
    assessment TEXT NOT NULL,
    metrics_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(change_id, horizon_days)
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_change
    ON checkpoints(change_id, horizon_days);

CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id TEXT NOT NULL,
    trigger_kind TEXT NOT NULL,
    status TEXT NOT NULL,
    screenshot_path TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analyses_page_created
    ON analyses(page_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_analyses_status
    ON analyses(status, trigger_kind);
"#;
