use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod context;
mod control;
mod jira;
mod models;
mod report;
mod store;
mod weekly;

use config::Config;
use context::AnalysisContext;
use models::MetricKind;

#[derive(Parser)]
#[command(name = "control-chart")]
#[command(about = "Shewhart control charts for weekly Jira quality and throughput", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the local state schema
    InitDb,
    /// Store the JQL filter used by `fetch`
    Query { jql: String },
    /// Fetch issues for the stored (or given) JQL filter
    Fetch {
        #[arg(long)]
        jql: Option<String>,
    },
    /// Load issues from a saved search response or issue array
    Import {
        #[arg(long)]
        json: PathBuf,
    },
    /// Select the charted metric
    Metric {
        #[arg(value_enum)]
        kind: MetricKind,
    },
    /// Adjust or clear the baseline window (dates as YYYY-MM-DD)
    Baseline {
        #[arg(long, conflicts_with = "clear")]
        start: Option<NaiveDate>,
        #[arg(long, conflicts_with = "clear")]
        end: Option<NaiveDate>,
        #[arg(long)]
        clear: bool,
    },
    /// Print weekly aggregates
    Weekly,
    /// Print the control chart, optionally exporting it as CSV
    Chart {
        #[arg(long)]
        csv: Option<Option<PathBuf>>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

const DEFAULT_LOG_FILTER: &str = "control_chart=info";

/// `RUST_LOG` when it parses, otherwise info-level logs for this crate.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    store::init_db(&pool).await?;

    let mut ctx = AnalysisContext::load(&pool).await?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Query { jql } => {
            ctx.set_query(&pool, &jql).await?;
            println!("Query saved.");
        }
        Commands::Fetch { jql } => {
            if let Some(jql) = jql {
                ctx.set_query(&pool, &jql).await?;
            }
            if ctx.jql.trim().is_empty() {
                return Err(jira::FetchError::EmptyQuery.into());
            }

            let client = jira::JiraClient::new(config.require_jira_base_url()?, config.timeout)?;
            let count = ctx
                .refresh(&pool, &client, config.page_size, config.page_delay)
                .await?;
            println!("Fetched {count} issues.");
        }
        Commands::Import { json } => {
            let issues = jira::read_issue_file(&json)?;
            let count = issues.len();
            let resolved = issues.iter().filter(|issue| issue.is_resolved()).count();
            ctx.replace_issues(&pool, issues).await?;
            println!(
                "Imported {count} issues ({resolved} resolved) from {}.",
                json.display()
            );
        }
        Commands::Metric { kind } => {
            ctx.set_metric(&pool, kind).await?;
            println!("Metric set to {}.", kind.label());
        }
        Commands::Baseline { start, end, clear } => {
            if clear {
                ctx.set_baseline(&pool, None).await?;
                println!("Baseline cleared; the whole series is used.");
                return Ok(());
            }

            let weekly = ctx.weekly_metrics();
            let Some(window) =
                control::adjust_baseline(ctx.baseline.as_ref(), start, end, &weekly, today)
            else {
                println!("No weekly data yet; pass --start to set a baseline.");
                return Ok(());
            };
            ctx.set_baseline(&pool, Some(window)).await?;
            println!("Baseline set to {} through {}.", window.start, window.end);
            if ctx.baseline_is_empty() {
                warn!(start = %window.start, end = %window.end, "baseline window has no weeks");
                println!("No data available in selected period.");
            }
        }
        Commands::Weekly => {
            let weekly = ctx.weekly_metrics();
            if weekly.is_empty() {
                println!("No resolved issues found.");
                return Ok(());
            }

            println!("Weekly metrics:");
            for week in &weekly {
                println!(
                    "- {} resolved {} bugs {} density {:.2}% velocity {}",
                    week.week_start, week.total_issues, week.bugs, week.bug_density, week.velocity
                );
            }
        }
        Commands::Chart { csv } => {
            ctx.ensure_baseline(&pool, today).await?;
            let points = ctx.control_chart();
            if points.is_empty() {
                println!("No resolved issues found.");
                return Ok(());
            }
            if ctx.baseline_is_empty() {
                println!("No data available in selected period.");
            }

            let limits = &points[0];
            println!(
                "{}: center {:.2}, UCL {:.2}, LCL {:.2}",
                ctx.metric.label(),
                limits.center_line,
                limits.ucl,
                limits.lcl
            );
            for point in &points {
                println!(
                    "- {} {:.2}{}{}",
                    point.week.week_start,
                    point.value,
                    if point.is_baseline { " [baseline]" } else { "" },
                    if point.is_out_of_limits() { " OUT OF CONTROL" } else { "" }
                );
            }

            if let Some(path) = csv {
                let path = path.unwrap_or_else(|| {
                    PathBuf::from(report::default_export_name(ctx.metric, today))
                });
                report::export_chart_csv(&path, &points)?;
                println!("Chart exported to {}.", path.display());
            }
        }
        Commands::Report { out } => {
            ctx.ensure_baseline(&pool, today).await?;
            let points = ctx.control_chart();
            let report =
                report::build_report(&ctx.jql, ctx.metric, ctx.baseline.as_ref(), &points);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
