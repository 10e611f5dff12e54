use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PageConfig {
    /// Default page to operate on when the CLI gets no --page flag.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    /// Metrics-delta endpoint. Empty means no adapter is wired up and
    /// evaluation runs against empty deltas (everything inconclusive).
    #[serde(default)]
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
    #[serde(default = "default_baseline_max_age_days")]
    pub baseline_max_age_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook: String,
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub rules: AlertRulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRulesConfig {
    #[serde(default = "default_true")]
    pub change_validated: bool,
    #[serde(default = "default_true")]
    pub change_regressed: bool,
    #[serde(default = "default_true")]
    pub change_inconclusive: bool,
    #[serde(default = "default_true")]
    pub trend_reversed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub page_id: Option<String>,
    pub db_path: Option<String>,
    pub analytics_url: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/outcome-oracle/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(page_id) = overrides.page_id {
            self.page.id = page_id;
        }
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
        if let Some(analytics_url) = overrides.analytics_url {
            self.analytics.endpoint_url = analytics_url;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[page]
id = "landing"
url = "https://example.com/"

[storage]
db_path = "~/.local/share/outcome-oracle/oracle.db"

[analytics]
endpoint_url = ""

[evaluation]
watch_interval_secs = 3600
baseline_max_age_days = 14

[alerts]
webhook = ""
enable_stdout = true

[alerts.rules]
change_validated = true
change_regressed = true
change_inconclusive = true
trend_reversed = true
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            storage: StorageConfig::default(),
            analytics: AnalyticsConfig::default(),
            evaluation: EvaluationConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: default_watch_interval_secs(),
            baseline_max_age_days: default_baseline_max_age_days(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook: String::new(),
            enable_stdout: default_enable_stdout(),
            rules: AlertRulesConfig::default(),
        }
    }
}

impl Default for AlertRulesConfig {
    fn default() -> Self {
        Self {
            change_validated: true,
            change_regressed: true,
            change_inconclusive: true,
            trend_reversed: true,
        }
    }
}

fn default_db_path() -> String {
    "~/.local/share/outcome-oracle/oracle.db".to_string()
}

fn default_watch_interval_secs() -> u64 {
    3600
}

fn default_baseline_max_age_days() -> i64 {
    14
}

fn default_enable_stdout() -> bool {
    true
}

fn default_true() -> bool {
    true
}
