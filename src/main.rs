use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use outcome_oracle::alert::engine::{evaluate_alerts, AlertEvent};
use outcome_oracle::alert::rules::AlertEventKind;
use outcome_oracle::alert::sink::{AlertSink, StdoutSink, WebhookSink};
use outcome_oracle::baseline::selector::{is_baseline_stale, stable_baseline};
use outcome_oracle::config::{Config, ConfigOverrides};
use outcome_oracle::metrics::provider::{provider_for_endpoint, MetricsProvider};
use outcome_oracle::output::json::render_json;
use outcome_oracle::output::table::{
    render_baseline, render_changes_table, render_checkpoints_table, render_outcomes_table,
    render_progress_table,
};
use outcome_oracle::progress::ComposedProgress;
use outcome_oracle::runner::{
    page_progress, run_evaluation_pass, run_recovery, EvaluationOutcome,
};
use outcome_oracle::server::run_server;
use outcome_oracle::store::ChangeStore;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "outcome-oracle",
    about = "Change-outcome correlation for monitored web pages"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    page: Option<String>,
    #[arg(long)]
    db: Option<String>,
    #[arg(long = "analytics-url")]
    analytics_url: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one evaluation pass over every change with horizons due.
    Evaluate,
    /// Evaluate periodically, with a recovery sweep folded into each pass.
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long, default_value_t = 1)]
        iterations: u32,
    },
    /// Page-level progress rollup.
    Progress,
    /// List tracked changes for a page.
    Changes,
    /// Checkpoint history for one change.
    Checkpoints {
        #[arg(long)]
        change: i64,
    },
    /// Show the comparison baseline the next lightweight diff would use.
    Baseline,
    /// Re-trigger evaluation for analyses stuck in the recovery window.
    Recover,
    /// Register a detected change (the change-detection pipeline's entrypoint).
    RecordChange {
        #[arg(long)]
        url: String,
        #[arg(long)]
        element: String,
        #[arg(long)]
        detected_at: Option<String>,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        page_id: cli.page.clone(),
        db_path: cli.db.clone(),
        analytics_url: cli.analytics_url.clone(),
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }
    if let Commands::Serve { host, port } = &cli.command {
        let bind = format!("{host}:{port}");
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
        return run_server(config, addr).await;
    }

    let store = ChangeStore::open(&config.resolved_db_path())?;
    let provider = provider_for_endpoint(&config.analytics.endpoint_url);

    match &cli.command {
        Commands::Evaluate => {
            let outcomes =
                run_evaluation_pass(&store, provider.as_ref(), None, Utc::now()).await?;
            print_outcomes(&outcomes, cli.output)?;
        }
        Commands::Watch {
            interval_secs,
            iterations,
        } => {
            let interval = interval_secs.unwrap_or(config.evaluation.watch_interval_secs);
            run_watch_loop(&store, provider.as_ref(), &config, interval, *iterations).await?;
        }
        Commands::Progress => {
            let page_id = require_page(&config)?;
            let Some(progress) = page_progress(&store, &page_id, Utc::now()) else {
                return Err(anyhow!(
                    "progress unavailable for {page_id} and no snapshot cached"
                ));
            };
            print_progress(&progress, cli.output)?;
        }
        Commands::Changes => {
            let page_id = require_page(&config)?;
            let changes = store.load_evaluable_changes(Some(&page_id))?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_changes_table(&changes)),
                OutputFormat::Json => println!("{}", render_json(&changes)?),
            }
        }
        Commands::Checkpoints { change } => {
            let checkpoints = store.load_checkpoints(*change)?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_checkpoints_table(&checkpoints)),
                OutputFormat::Json => println!("{}", render_json(&checkpoints)?),
            }
        }
        Commands::Baseline => {
            let page_id = require_page(&config)?;
            let now = Utc::now();
            let pinned = store.pinned_analysis_id(&page_id)?;
            let analyses = store.load_analyses(&page_id)?;
            let baseline = stable_baseline(pinned, &analyses, now);
            let stale = is_baseline_stale(
                baseline.as_ref(),
                config.evaluation.baseline_max_age_days,
                now,
            );
            match cli.output {
                OutputFormat::Table => println!("{}", render_baseline(baseline.as_ref(), stale)),
                OutputFormat::Json => {
                    println!(
                        "{}",
                        render_json(&serde_json::json!({
                            "baseline": baseline,
                            "stale": stale,
                        }))?
                    );
                }
            }
        }
        Commands::Recover => {
            let outcomes = run_recovery(&store, provider.as_ref(), Utc::now()).await?;
            print_outcomes(&outcomes, cli.output)?;
        }
        Commands::RecordChange {
            url,
            element,
            detected_at,
        } => {
            let page_id = require_page(&config)?;
            let detected_at = match detected_at {
                Some(raw) => raw
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| anyhow!("invalid --detected-at timestamp {raw}: {e}"))?,
                None => Utc::now(),
            };
            store.upsert_page(&page_id, url)?;
            let id = store.insert_change(&page_id, element, detected_at)?;
            info!("recorded change {id} on page {page_id}");
            println!("{id}");
        }
        Commands::Config { .. } => {}
        Commands::Serve { .. } => unreachable!("serve command handled before dispatch"),
    }

    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn require_page(config: &Config) -> Result<String> {
    let page_id = config.page.id.trim();
    if page_id.is_empty() {
        return Err(anyhow!(
            "no page selected: pass --page or set [page].id in the config"
        ));
    }
    Ok(page_id.to_string())
}

async fn run_watch_loop(
    store: &ChangeStore,
    provider: &dyn MetricsProvider,
    config: &Config,
    interval_secs: u64,
    iterations: u32,
) -> Result<()> {
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
    if config.alerts.enable_stdout {
        sinks.push(Box::new(StdoutSink));
    }
    if !config.alerts.webhook.trim().is_empty() {
        sinks.push(Box::new(WebhookSink::new(config.alerts.webhook.clone())));
    }

    let interval = Duration::from_secs(interval_secs.max(1));
    let total_iterations = iterations.max(1);
    for i in 0..total_iterations {
        info!("watch iteration {}", i + 1);
        let now = Utc::now();

        let mut outcomes = run_evaluation_pass(store, provider, None, now).await?;
        match run_recovery(store, provider, now).await {
            Ok(recovered) => outcomes.extend(recovered),
            Err(err) => warn!("recovery sweep failed: {err:#}"),
        }

        let alerts = apply_alert_rules(evaluate_alerts(&outcomes), config);
        for alert in &alerts {
            for sink in &sinks {
                if let Err(err) = sink.send(alert).await {
                    warn!("failed sending alert: {err}");
                }
            }
        }

        if i + 1 < total_iterations {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}

fn apply_alert_rules(alerts: Vec<AlertEvent>, config: &Config) -> Vec<AlertEvent> {
    alerts
        .into_iter()
        .filter(|event| match event.kind {
            AlertEventKind::ChangeValidated => config.alerts.rules.change_validated,
            AlertEventKind::ChangeRegressed => config.alerts.rules.change_regressed,
            AlertEventKind::ChangeInconclusive => config.alerts.rules.change_inconclusive,
            AlertEventKind::TrendReversed => config.alerts.rules.trend_reversed,
        })
        .collect()
}

fn print_outcomes(outcomes: &[EvaluationOutcome], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_outcomes_table(outcomes)),
        OutputFormat::Json => println!("{}", render_json(&outcomes)?),
    }
    Ok(())
}

fn print_progress(progress: &ComposedProgress, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_progress_table(progress)),
        OutputFormat::Json => println!("{}", render_json(progress)?),
    }
    Ok(())
}
